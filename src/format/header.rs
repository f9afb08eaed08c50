//! Header cards carried from the input to the outputs
//!
//! Cards are kept in file order so that the writers can reproduce the source
//! metadata. Layout keywords are owned by the writers and dropped by
//! [`Header::sanitized`]; the rescale provenance keywords are added here.

use crate::types::ScaleParameters;
use std::fmt;

/// Set when the image was stretched from a normalized range before detection
pub const RESCALED_KEYWORD: &str = "BBRESCAL";
/// Factor of the stretch recorded under [`RESCALED_KEYWORD`]
pub const RESCALE_FACTOR_KEYWORD: &str = "BBRSCFAC";

const CARD_LEN: usize = 80;
const KEYWORD_LEN: usize = 8;
const COMMENTARY_TEXT_LEN: usize = CARD_LEN - KEYWORD_LEN;

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl HeaderValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Parse a value field (the text after `= `) into a value and comment
    #[must_use]
    pub fn parse_field(field: &str) -> (Option<Self>, Option<String>) {
        let trimmed = field.trim_start();

        if let Some(quoted) = trimmed.strip_prefix('\'') {
            let (text, rest) = parse_quoted(quoted);
            return (Some(Self::Text(text)), parse_comment(rest));
        }

        let (raw, comment) = match trimmed.split_once('/') {
            Some((raw, comment)) => (raw.trim(), Some(comment.trim().to_string())),
            None => (trimmed.trim(), None),
        };
        let comment = comment.filter(|c| !c.is_empty());

        (Self::parse_plain(raw), comment)
    }

    /// Parse an unquoted value; quoted text is only recognised by [`Self::parse_field`]
    #[must_use]
    pub fn parse_plain(raw: &str) -> Option<Self> {
        match raw {
            "" => None,
            "T" => Some(Self::Logical(true)),
            "F" => Some(Self::Logical(false)),
            _ => raw
                .parse::<i64>()
                .map(Self::Integer)
                .ok()
                .or_else(|| raw.replace(['D', 'd'], "E").parse::<f64>().ok().map(Self::Real)),
        }
    }

    /// Fixed-format value text, `None` for values FITS cannot represent
    #[must_use]
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::Logical(v) => Some(format!("{:>20}", if *v { "T" } else { "F" })),
            Self::Integer(v) => Some(format!("{v:>20}")),
            Self::Real(v) => format_real(*v).map(|s| format!("{s:>20}")),
            Self::Text(s) => {
                if !s.is_ascii() {
                    return None;
                }
                let escaped = s.replace('\'', "''");
                Some(format!("'{escaped:<8}'"))
            }
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical(v) => write!(f, "{}", if *v { "T" } else { "F" }),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{}", format_real(*v).unwrap_or_else(|| v.to_string())),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

fn parse_quoted(quoted: &str) -> (String, &str) {
    let mut text = String::new();
    let mut chars = quoted.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                text.push('\'');
                chars.next();
                continue;
            }
            return (text.trim_end().to_string(), &quoted[idx + 1..]);
        }
        text.push(ch);
    }

    // Unterminated string: keep what we have
    (text.trim_end().to_string(), "")
}

fn parse_comment(rest: &str) -> Option<String> {
    rest.split_once('/')
        .map(|(_, comment)| comment.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn format_real(v: f64) -> Option<String> {
    if !v.is_finite() {
        return None;
    }

    let mut s = format!("{v:?}").to_uppercase();
    if !s.contains('.') && !s.contains('E') {
        s.push_str(".0");
    }
    if s.len() > 20 {
        s = format!("{v:.12E}");
    }
    Some(s)
}

/// One header record. Cards without a value are commentary (`COMMENT`,
/// `HISTORY`, blank keyword) and carry their text in `comment`.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<HeaderValue>,
    pub comment: Option<String>,
}

impl Card {
    #[must_use]
    pub fn new(keyword: &str, value: HeaderValue, comment: Option<&str>) -> Self {
        Self {
            keyword: keyword.trim().to_uppercase(),
            value: Some(value),
            comment: comment.map(str::to_string),
        }
    }

    #[must_use]
    pub fn commentary(keyword: &str, text: &str) -> Self {
        Self {
            keyword: keyword.trim().to_uppercase(),
            value: None,
            comment: Some(text.to_string()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_commentary(&self) -> bool {
        self.value.is_none()
    }

    /// Parse one 80-byte header record
    ///
    /// The keyword is split off on raw bytes, so stray non-ASCII bytes never
    /// move the keyword/value boundary.
    #[must_use]
    pub fn parse_record(record: &[u8]) -> Self {
        let (keyword, rest) = record.split_at(record.len().min(KEYWORD_LEN));
        let keyword = String::from_utf8_lossy(keyword).trim_end().to_string();
        let rest = String::from_utf8_lossy(rest);
        let is_commentary = matches!(keyword.as_str(), "COMMENT" | "HISTORY" | "");

        if !is_commentary && let Some(field) = rest.strip_prefix("= ") {
            let (value, comment) = HeaderValue::parse_field(field);
            if value.is_some() {
                return Self {
                    keyword,
                    value,
                    comment,
                };
            }
        }

        Self {
            keyword,
            value: None,
            comment: Some(rest.trim_end().to_string()).filter(|t| !t.is_empty()),
        }
    }

    /// Encode as an 80-byte record, `None` when the card cannot be represented
    #[must_use]
    pub fn to_record(&self) -> Option<String> {
        if self.keyword.len() > KEYWORD_LEN || !self.keyword.is_ascii() {
            return None;
        }

        let mut record = match &self.value {
            None => {
                let text = self.comment.as_deref().unwrap_or("");
                if !text.is_ascii() {
                    return None;
                }
                let text: String = text.chars().take(COMMENTARY_TEXT_LEN).collect();
                format!("{:<8}{text}", self.keyword)
            }
            Some(value) => {
                let mut record = format!("{:<8}= {}", self.keyword, value.encode()?);
                if record.len() > CARD_LEN {
                    return None;
                }
                if let Some(comment) = self.comment.as_deref().filter(|c| c.is_ascii()) {
                    record.push_str(" / ");
                    record.push_str(comment);
                    record.truncate(CARD_LEN);
                }
                record
            }
        };

        record.truncate(CARD_LEN);
        Some(format!("{record:<80}"))
    }
}

/// Ordered list of header cards
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        let keyword = keyword.to_uppercase();
        self.cards
            .iter()
            .find(|c| !c.is_commentary() && c.keyword == keyword)
            .and_then(|c| c.value.as_ref())
    }

    #[must_use]
    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(HeaderValue::as_f64)
    }

    #[must_use]
    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(HeaderValue::as_i64)
    }

    #[must_use]
    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        self.get(keyword).and_then(HeaderValue::as_bool)
    }

    #[must_use]
    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(HeaderValue::as_str)
    }

    /// Replace the first card with this keyword or append a new one
    pub fn set(&mut self, keyword: &str, value: HeaderValue, comment: Option<&str>) {
        let card = Card::new(keyword, value, comment);
        match self
            .cards
            .iter_mut()
            .find(|c| !c.is_commentary() && c.keyword == card.keyword)
        {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn add_history(&mut self, text: &str) {
        self.add_commentary("HISTORY", text);
    }

    pub fn add_comment(&mut self, text: &str) {
        self.add_commentary("COMMENT", text);
    }

    // Long text is split over consecutive cards
    fn add_commentary(&mut self, keyword: &str, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            self.cards.push(Card::commentary(keyword, ""));
            return;
        }
        for chunk in chars.chunks(COMMENTARY_TEXT_LEN) {
            let line: String = chunk.iter().collect();
            self.cards.push(Card::commentary(keyword, &line));
        }
    }

    #[must_use]
    pub fn history(&self) -> Vec<&str> {
        self.commentary("HISTORY")
    }

    #[must_use]
    pub fn comments(&self) -> Vec<&str> {
        self.commentary("COMMENT")
    }

    fn commentary(&self, keyword: &str) -> Vec<&str> {
        self.cards
            .iter()
            .filter(|c| c.is_commentary() && c.keyword == keyword)
            .filter_map(|c| c.comment.as_deref())
            .collect()
    }

    /// Copy without commentary, continuation and data-layout cards
    ///
    /// Layout keywords are regenerated by the writers, commentary is dropped
    /// so that each run appends exactly one history entry.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        Self {
            cards: self
                .cards
                .iter()
                .filter(|c| !c.is_commentary())
                .filter(|c| c.keyword != "CONTINUE" && !is_structural(&c.keyword))
                .cloned()
                .collect(),
        }
    }

    /// Record that the image was stretched with `scale` before detection
    pub fn record_rescale(&mut self, scale: ScaleParameters) {
        self.set(
            RESCALED_KEYWORD,
            HeaderValue::Logical(true),
            Some("BB rescaled from normalized"),
        );
        self.set(
            RESCALE_FACTOR_KEYWORD,
            HeaderValue::Real(scale.factor()),
            Some("BB rescale factor"),
        );
    }

    /// The recorded rescale factor, if the image was marked as rescaled
    #[must_use]
    pub fn recorded_rescale_factor(&self) -> Option<f64> {
        if self.get_bool(RESCALED_KEYWORD) == Some(true) {
            self.get_f64(RESCALE_FACTOR_KEYWORD)
        } else {
            None
        }
    }
}

/// Keywords describing the data layout, owned by the writers
///
/// Includes the binary-table keywords of tile-compressed images, whose raw
/// header describes the compressed table rather than the image.
#[must_use]
pub fn is_structural(keyword: &str) -> bool {
    const INDEXED: [&str; 9] = [
        "NAXIS", "ZNAXIS", "ZTILE", "ZNAME", "ZVAL", "TTYPE", "TFORM", "TUNIT", "TDIM",
    ];
    if INDEXED.iter().any(|prefix| {
        keyword
            .strip_prefix(prefix)
            .is_some_and(|index| index.chars().all(|c| c.is_ascii_digit()))
    }) {
        return true;
    }

    matches!(
        keyword,
        "SIMPLE"
            | "BITPIX"
            | "EXTEND"
            | "XTENSION"
            | "PCOUNT"
            | "GCOUNT"
            | "BSCALE"
            | "BZERO"
            | "BLANK"
            | "END"
            | "CHECKSUM"
            | "DATASUM"
            | "TFIELDS"
            | "THEAP"
            | "ZIMAGE"
            | "ZSIMPLE"
            | "ZTENSION"
            | "ZBITPIX"
            | "ZEXTEND"
            | "ZPCOUNT"
            | "ZGCOUNT"
            | "ZCMPTYPE"
            | "ZQUANTIZ"
            | "ZDITHER0"
            | "ZBLANK"
            | "ZBLOCKED"
            | "ZHECKSUM"
            | "ZDATASUM"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> Vec<u8> {
        format!("{text:<80}").into_bytes()
    }

    #[test]
    fn test_parse_logical_integer_real() {
        let card = Card::parse_record(&record("SIMPLE  =                    T / conforms"));
        assert_eq!(card.value, Some(HeaderValue::Logical(true)));
        assert_eq!(card.comment.as_deref(), Some("conforms"));

        let card = Card::parse_record(&record("NAXIS1  =                 4096"));
        assert_eq!(card.value, Some(HeaderValue::Integer(4096)));
        assert!(card.comment.is_none());

        let card = Card::parse_record(&record("EXPTIME =              1.5D+02 / seconds"));
        assert_eq!(card.value, Some(HeaderValue::Real(150.0)));
    }

    #[test]
    fn test_parse_string_with_quote_and_slash() {
        let card = Card::parse_record(&record("OBJECT  = 'M31 / Andromeda''s' / target"));
        assert_eq!(card.keyword, "OBJECT");
        assert_eq!(
            card.value,
            Some(HeaderValue::Text("M31 / Andromeda's".to_string()))
        );
        assert_eq!(card.comment.as_deref(), Some("target"));
    }

    #[test]
    fn test_parse_commentary() {
        let card = Card::parse_record(&record("HISTORY calibrated = yes"));
        assert!(card.is_commentary());
        assert_eq!(card.keyword, "HISTORY");
        assert_eq!(card.comment.as_deref(), Some("calibrated = yes"));
    }

    #[test]
    fn test_record_layout() {
        let card = Card::new("BBRSCFAC", HeaderValue::Real(43690.0), Some("BB rescale factor"));
        let record = card.to_record().unwrap();
        assert_eq!(record.len(), 80);
        let expected = format!("BBRSCFAC= {:>20} / BB rescale factor", "43690.0");
        assert!(record.starts_with(&expected));

        let card = Card::new("OBJECT", HeaderValue::Text("M1".into()), None);
        let expected = format!("OBJECT  = '{:<8}'", "M1");
        assert_eq!(card.to_record().unwrap().trim_end(), expected);
    }

    #[test]
    fn test_record_rejects_long_keyword() {
        let card = Card::new("TOOLONGKEY", HeaderValue::Integer(1), None);
        assert!(card.to_record().is_none());

        let card = Card::new("RATIO", HeaderValue::Real(f64::NAN), None);
        assert!(card.to_record().is_none());
    }

    #[test]
    fn test_record_round_trip_values() {
        for value in [
            HeaderValue::Logical(false),
            HeaderValue::Integer(-32768),
            HeaderValue::Real(1.0e-7),
            HeaderValue::Real(6.02e23),
            HeaderValue::Text("it's".to_string()),
        ] {
            let card = Card::new("KEY", value.clone(), Some("note"));
            let parsed = Card::parse_record(card.to_record().unwrap().as_bytes());
            assert_eq!(parsed.value, Some(value));
            assert_eq!(parsed.comment.as_deref(), Some("note"));
        }
    }

    #[test]
    fn test_set_replaces() {
        let mut header = Header::new();
        header.set("GAIN", HeaderValue::Real(1.0), None);
        header.set("gain", HeaderValue::Real(2.5), Some("e-/ADU"));
        assert_eq!(header.len(), 1);
        assert_eq!(header.get_f64("GAIN"), Some(2.5));
    }

    #[test]
    fn test_non_ascii_keyword_byte_keeps_boundary() {
        let mut raw = record("OBJ_CT  = 'M31     ' / target");
        raw[3] = 0xFF;

        let card = Card::parse_record(&raw);
        assert_eq!(card.keyword.chars().count(), 6);
        assert!(card.keyword.starts_with("OBJ") && card.keyword.ends_with("CT"));
        assert_eq!(card.value, Some(HeaderValue::Text("M31".to_string())));
        assert_eq!(card.comment.as_deref(), Some("target"));
        assert!(card.to_record().is_none());
    }

    #[test]
    fn test_tile_compression_keywords_are_structural() {
        for keyword in ["ZIMAGE", "ZNAXIS2", "ZTILE1", "TFORM1", "ZCMPTYPE", "NAXIS"] {
            assert!(is_structural(keyword), "{keyword}");
        }
        for keyword in ["OBJECT", "ZENITH", "TFORMAT", "NAXISX"] {
            assert!(!is_structural(keyword), "{keyword}");
        }
    }

    #[test]
    fn test_long_history_is_split() {
        let mut header = Header::new();
        header.add_history(&"x".repeat(100));
        let history = header.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].len(), 72);
        assert_eq!(history[1].len(), 28);
    }

    #[test]
    fn test_sanitized_drops_commentary_and_layout() {
        let mut header = Header::new();
        header.set("BITPIX", HeaderValue::Integer(16), None);
        header.set("NAXIS2", HeaderValue::Integer(10), None);
        header.set("NAXISX", HeaderValue::Integer(1), None);
        header.set("BZERO", HeaderValue::Integer(32768), None);
        header.set("OBJECT", HeaderValue::Text("M42".into()), None);
        header.add_comment("old comment");
        header.add_history("old history");
        header.push(Card::commentary("CONTINUE", "'tail'"));

        let clean = header.sanitized();
        let keywords: Vec<&str> = clean.cards().iter().map(|c| c.keyword.as_str()).collect();
        assert_eq!(keywords, ["NAXISX", "OBJECT"]);
    }

    #[test]
    fn test_record_rescale() {
        let mut header = Header::new();
        assert!(header.recorded_rescale_factor().is_none());

        header.record_rescale(ScaleParameters::new(43690.0, 0.0).unwrap());
        assert_eq!(header.get_bool(RESCALED_KEYWORD), Some(true));
        assert_eq!(header.recorded_rescale_factor(), Some(43690.0));
    }
}
