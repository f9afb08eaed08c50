//! Monolithic XISF reading and writing
//!
//! Layout: the `XISF0100` signature, a little-endian `u32` XML header length,
//! four reserved bytes, the UTF-8 XML header, then attached data blocks
//! addressed by `location="attachment:<position>:<size>"`. Attached blocks
//! may be zlib compressed, optionally byte-shuffled.

use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;
use roxmltree::{Document, Node};

use super::RawImage;
use super::error::{FormatError, Result};
use super::header::{Card, Header, HeaderValue};
use crate::image::{Image, find_min_max};
use crate::types::SampleFormat;

const SIGNATURE: &[u8; 8] = b"XISF0100";
const PREAMBLE_LEN: usize = 16;
const BLOCK_ALIGNMENT: usize = 4096;
const CREATOR: &str = concat!("crr ", env!("CARGO_PKG_VERSION"));

fn invalid(msg: impl Into<String>) -> FormatError {
    FormatError::InvalidXisf(msg.into())
}

pub fn read_xisf(path: &Path) -> Result<(RawImage, Header)> {
    let bytes = std::fs::read(path).map_err(|source| FormatError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_xisf(&bytes)
}

/// Decode the first image of an in-memory XISF file
///
/// The returned shape is `[channels, height, width]`.
pub fn decode_xisf(bytes: &[u8]) -> Result<(RawImage, Header)> {
    if bytes.len() < PREAMBLE_LEN || &bytes[..8] != SIGNATURE {
        return Err(invalid("missing XISF0100 signature"));
    }

    let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let xml = PREAMBLE_LEN
        .checked_add(header_len)
        .and_then(|end| bytes.get(PREAMBLE_LEN..end))
        .ok_or_else(|| invalid("XML header is truncated"))?;
    let xml = std::str::from_utf8(xml).map_err(|e| invalid(format!("XML header is not UTF-8: {e}")))?;
    let document = Document::parse(xml).map_err(|e| invalid(format!("malformed XML header: {e}")))?;

    let image = document
        .descendants()
        .find(|n| n.has_tag_name("Image"))
        .ok_or_else(|| invalid("no Image element"))?;

    let (width, height, channels) = parse_geometry(required(image, "geometry")?)?;
    let sample = SampleKind::parse(required(image, "sampleFormat")?)?;
    let (position, size) = parse_location(required(image, "location")?)?;
    let big_endian = image.attribute("byteOrder") == Some("big");
    let interleaved = image.attribute("pixelStorage") == Some("Normal");

    let count = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| invalid(format!("geometry {width}:{height}:{channels} overflows")))?;
    let needed = count
        .checked_mul(sample.size())
        .ok_or_else(|| invalid(format!("{count} samples overflow the addressable size")))?;
    let block = position
        .checked_add(size)
        .and_then(|end| bytes.get(position..end))
        .ok_or_else(|| invalid("attached data block is truncated"))?;

    let data = match image.attribute("compression") {
        Some(compression) => Cow::Owned(decompress(block, compression, needed)?),
        None => Cow::Borrowed(block.get(..needed).ok_or_else(|| {
            invalid(format!("attachment holds {size} bytes, image needs {needed}"))
        })?),
    };

    let samples = sample.decode(&data, big_endian);
    let pixels = if interleaved && channels > 1 {
        let plane = width * height;
        let mut planar = vec![0.0; count];
        for (i, v) in samples.into_iter().enumerate() {
            planar[(i % channels) * plane + i / channels] = v;
        }
        planar
    } else {
        samples
    };

    Ok((
        RawImage {
            shape: vec![channels, height, width],
            pixels,
        },
        parse_keywords(image),
    ))
}

fn required<'a>(image: Node<'a, '_>, name: &str) -> Result<&'a str> {
    image
        .attribute(name)
        .ok_or_else(|| invalid(format!("Image has no {name}")))
}

#[derive(Debug, Clone, Copy)]
enum SampleKind {
    UInt8,
    UInt16,
    UInt32,
    Float32,
    Float64,
}

impl SampleKind {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "UInt8" => Self::UInt8,
            "UInt16" => Self::UInt16,
            "UInt32" => Self::UInt32,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            other => return Err(FormatError::UnsupportedSampleFormat(other.to_string())),
        })
    }

    fn size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    fn decode(self, data: &[u8], big_endian: bool) -> Vec<f64> {
        macro_rules! decode_as {
            ($ty:ty, $n:expr) => {
                data.chunks_exact($n)
                    .map(|c| {
                        let raw: [u8; $n] = c.try_into().unwrap_or_default();
                        let v = if big_endian {
                            <$ty>::from_be_bytes(raw)
                        } else {
                            <$ty>::from_le_bytes(raw)
                        };
                        f64::from(v)
                    })
                    .collect()
            };
        }

        match self {
            Self::UInt8 => data.iter().map(|&b| f64::from(b)).collect(),
            Self::UInt16 => decode_as!(u16, 2),
            Self::UInt32 => decode_as!(u32, 4),
            Self::Float32 => decode_as!(f32, 4),
            Self::Float64 => decode_as!(f64, 8),
        }
    }
}

fn parse_count(text: &str, what: &str, attribute: &str) -> Result<usize> {
    text.trim()
        .parse()
        .map_err(|_| invalid(format!("invalid {what} '{attribute}'")))
}

fn parse_geometry(geometry: &str) -> Result<(usize, usize, usize)> {
    let dims = geometry
        .split(':')
        .map(|d| parse_count(d, "geometry", geometry))
        .collect::<Result<Vec<_>>>()?;

    match dims.as_slice() {
        [w, h] => Ok((*w, *h, 1)),
        [w, h, c] => Ok((*w, *h, *c)),
        _ => Err(invalid(format!("unsupported geometry '{geometry}'"))),
    }
}

fn parse_location(location: &str) -> Result<(usize, usize)> {
    match location.split(':').collect::<Vec<_>>().as_slice() {
        ["attachment", pos, size] => Ok((
            parse_count(pos, "location", location)?,
            parse_count(size, "location", location)?,
        )),
        _ => Err(invalid(format!("unsupported data location '{location}'"))),
    }
}

/// Inflate an attached block described by `codec:size[:item-size]`
fn decompress(block: &[u8], compression: &str, expected: usize) -> Result<Vec<u8>> {
    let (codec, uncompressed, item_size) = match compression.split(':').collect::<Vec<_>>().as_slice() {
        [codec, size] => (*codec, parse_count(size, "compression", compression)?, 1),
        [codec, size, item] => (
            *codec,
            parse_count(size, "compression", compression)?,
            parse_count(item, "compression", compression)?,
        ),
        _ => return Err(invalid(format!("invalid compression '{compression}'"))),
    };
    let (codec, shuffled) = match codec.strip_suffix("+sh") {
        Some(base) => (base, true),
        None => (codec, false),
    };

    if codec != "zlib" {
        return Err(FormatError::UnsupportedCompression(codec.to_string()));
    }
    if uncompressed != expected {
        return Err(invalid(format!(
            "compressed block inflates to {uncompressed} bytes, image needs {expected}"
        )));
    }

    let mut data = Vec::new();
    ZlibDecoder::new(block)
        .take((expected as u64).saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|e| invalid(format!("corrupt zlib block: {e}")))?;
    if data.len() != expected {
        return Err(invalid(format!(
            "zlib block inflated to {} bytes, expected {expected}",
            data.len()
        )));
    }

    Ok(if shuffled && item_size > 1 {
        unshuffle(&data, item_size)
    } else {
        data
    })
}

/// Undo byte shuffling: byte `b` of item `i` is stored at `b * items + i`,
/// trailing bytes that do not fill an item are stored as is
fn unshuffle(data: &[u8], item_size: usize) -> Vec<u8> {
    let items = data.len() / item_size;
    let body = items * item_size;
    let mut out = vec![0; data.len()];

    for (i, &byte) in data[..body].iter().enumerate() {
        out[(i % items) * item_size + i / items] = byte;
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

fn parse_keywords(image: Node<'_, '_>) -> Header {
    let mut header = Header::new();

    for keyword in image.children().filter(|n| n.has_tag_name("FITSKeyword")) {
        let get = |name: &str| keyword.attribute(name).unwrap_or("").trim();
        let name = get("name");
        let value = get("value");
        let comment = get("comment");

        if matches!(name, "COMMENT" | "HISTORY") {
            let text = if comment.is_empty() { value } else { comment };
            header.push(Card::commentary(name, text));
            continue;
        }

        let parsed = if value.starts_with('\'') {
            HeaderValue::parse_field(value).0
        } else {
            HeaderValue::parse_plain(value)
                .or_else(|| (!value.is_empty()).then(|| HeaderValue::Text(value.to_string())))
        };
        if let Some(parsed) = parsed {
            header.push(Card::new(name, parsed, Some(comment).filter(|c| !c.is_empty())));
        }
    }

    header
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Write `image` as a single-channel gray XISF image, overwriting any existing file
pub fn write_xisf(path: &Path, image: &Image, header: &Header, format: SampleFormat) -> Result<()> {
    let bytes = encode_xisf(image, header, format);
    std::fs::write(path, bytes).map_err(|source| FormatError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[must_use]
pub fn encode_xisf(image: &Image, header: &Header, format: SampleFormat) -> Vec<u8> {
    let data_len = image.pixels().len() * format.bytes_per_sample();

    // The data position is written inside the header, so iterate until the
    // header length stops moving it
    let mut position = 0;
    let xml = loop {
        let xml = xml_header(image, header, format, position, data_len);
        let needed = (PREAMBLE_LEN + xml.len()).div_ceil(BLOCK_ALIGNMENT) * BLOCK_ALIGNMENT;
        if needed == position {
            break xml;
        }
        position = needed;
    };

    let mut out = Vec::with_capacity(position + data_len);
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&(xml.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(xml.as_bytes());
    out.resize(position, 0);

    for &v in image.pixels() {
        match format {
            SampleFormat::UInt8 => out.push(v.clamp(0.0, 255.0) as u8),
            SampleFormat::Float32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
            SampleFormat::Float64 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    out
}

fn xml_header(
    image: &Image,
    header: &Header,
    format: SampleFormat,
    position: usize,
    data_len: usize,
) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        "\n",
        r#"<xisf version="1.0" xmlns="http://www.pixinsight.com/xisf" "#,
        r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
        r#"xsi:schemaLocation="http://www.pixinsight.com/xisf http://pixinsight.com/xisf/xisf-1.0.xsd">"#,
        "\n",
    ));

    let bounds = match format {
        SampleFormat::UInt8 => String::new(),
        SampleFormat::Float32 | SampleFormat::Float64 => {
            let (lo, hi) = find_min_max(image.pixels());
            if (lo >= 0.0 && hi <= 1.0) || hi.partial_cmp(&lo) != Some(std::cmp::Ordering::Greater) {
                r#" bounds="0:1""#.to_string()
            } else {
                format!(r#" bounds="{lo}:{hi}""#)
            }
        }
    };

    xml.push_str(&format!(
        r#"<Image geometry="{w}:{h}:1" sampleFormat="{sf}"{bounds} colorSpace="Gray" location="attachment:{position}:{data_len}">"#,
        w = image.cols(),
        h = image.rows(),
        sf = format.xisf_name(),
    ));
    xml.push('\n');

    for card in header.cards() {
        let value = card.value.as_ref().map(ToString::to_string).unwrap_or_default();
        let comment = card.comment.as_deref().unwrap_or("");
        xml.push_str(&format!(
            r#"<FITSKeyword name="{}" value="{}" comment="{}"/>"#,
            escape(&card.keyword),
            escape(&value),
            escape(comment)
        ));
        xml.push('\n');
    }

    xml.push_str("</Image>\n<Metadata>\n");
    xml.push_str(&format!(
        r#"<Property id="XISF:CreatorApplication" type="String">{}</Property>"#,
        escape(CREATOR)
    ));
    xml.push_str("\n</Metadata>\n</xisf>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;
    use tempfile::tempdir;

    fn build(xml: &str, data: &[u8], position: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&(xml.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(xml.as_bytes());
        out.resize(position, 0);
        out.extend_from_slice(data);
        out
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn float32_le(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_round_trip_float32_with_keywords() {
        let image = Image::from_rows(&[[0.0, 0.5, 1.0], [0.25, 0.75, 0.125]]).unwrap();
        let mut header = Header::new();
        header.set("OBJECT", HeaderValue::Text("NGC <7000> & co".into()), Some("target"));
        header.set("EXPTIME", HeaderValue::Real(300.0), None);
        header.set("BBRESCAL", HeaderValue::Logical(true), None);
        header.add_history("processed");

        let bytes = encode_xisf(&image, &header, SampleFormat::Float32);
        let (raw, read) = decode_xisf(&bytes).unwrap();

        assert_eq!(raw.shape, vec![1, 2, 3]);
        assert_eq!(raw.pixels, image.pixels());
        assert_eq!(read.get_str("OBJECT"), Some("NGC <7000> & co"));
        assert_eq!(read.get_f64("EXPTIME"), Some(300.0));
        assert_eq!(read.get_bool("BBRESCAL"), Some(true));
        assert_eq!(read.history(), vec!["processed"]);
    }

    #[test]
    fn test_data_is_block_aligned() {
        let image = Image::from_rows(&[[1.0, 0.0]]).unwrap();
        let bytes = encode_xisf(&image, &Header::new(), SampleFormat::UInt8);
        assert_eq!(bytes.len(), BLOCK_ALIGNMENT + 2);
        assert_eq!(&bytes[BLOCK_ALIGNMENT..], &[1, 0]);
    }

    #[test]
    fn test_uint16_big_endian_interleaved() {
        let xml = r#"<xisf version="1.0"><Image geometry="2:1:2" sampleFormat="UInt16" byteOrder="big" pixelStorage="Normal" location="attachment:1024:8"/></xisf>"#;
        let mut data = Vec::new();
        for v in [1u16, 10, 2, 20] {
            data.extend_from_slice(&v.to_be_bytes());
        }

        let (raw, header) = decode_xisf(&build(xml, &data, 1024)).unwrap();
        assert_eq!(raw.shape, vec![2, 1, 2]);
        assert_eq!(raw.pixels, vec![1.0, 2.0, 10.0, 20.0]);
        assert!(header.is_empty());
    }

    #[test]
    fn test_plain_keyword_values() {
        let xml = r#"<xisf xmlns="http://www.pixinsight.com/xisf"><Image geometry="1:1" sampleFormat="UInt8" location="attachment:1024:1"><FITSKeyword name="FILTER" value="Ha" comment=""/><FITSKeyword name="GAIN" value="120" comment="sensor gain"/></Image></xisf>"#;
        let (raw, header) = decode_xisf(&build(xml, &[7], 1024)).unwrap();
        assert_eq!(raw.pixels, vec![7.0]);
        assert_eq!(header.get_str("FILTER"), Some("Ha"));
        assert_eq!(header.get_i64("GAIN"), Some(120));
    }

    #[test]
    fn test_zlib_compressed_float32() {
        let data = float32_le(&[0.5, 1.0, 0.25, 0.0]);
        let packed = zlib(&data);
        let xml = format!(
            r#"<xisf><Image geometry="2:2:1" sampleFormat="Float32" compression="zlib:16" location="attachment:1024:{}"/></xisf>"#,
            packed.len()
        );

        let (raw, _) = decode_xisf(&build(&xml, &packed, 1024)).unwrap();
        assert_eq!(raw.shape, vec![1, 2, 2]);
        assert_eq!(raw.pixels, vec![0.5, 1.0, 0.25, 0.0]);
    }

    #[test]
    fn test_zlib_byte_shuffled_float32() {
        let values = [0.5f32, 1.0, 0.25];
        let data = float32_le(&values);
        // Byte b of item i goes to b * items + i
        let mut shuffled = vec![0u8; data.len()];
        for (i, chunk) in data.chunks_exact(4).enumerate() {
            for (b, &byte) in chunk.iter().enumerate() {
                shuffled[b * values.len() + i] = byte;
            }
        }
        let packed = zlib(&shuffled);
        let xml = format!(
            r#"<xisf><Image geometry="3:1:1" sampleFormat="Float32" compression="zlib+sh:12:4" location="attachment:1024:{}"/></xisf>"#,
            packed.len()
        );

        let (raw, _) = decode_xisf(&build(&xml, &packed, 1024)).unwrap();
        assert_eq!(raw.pixels, vec![0.5, 1.0, 0.25]);
    }

    #[test]
    fn test_unshuffle_keeps_trailing_bytes() {
        assert_eq!(unshuffle(&[1, 3, 2, 4, 9], 2), vec![1, 2, 3, 4, 9]);
        assert_eq!(unshuffle(&[5], 4), vec![5]);
    }

    #[test]
    fn test_compression_errors() {
        let xml = r#"<xisf><Image geometry="1:1:1" sampleFormat="UInt8" compression="lz4:1" location="attachment:1024:1"/></xisf>"#;
        assert_matches!(
            decode_xisf(&build(xml, &[0], 1024)),
            Err(FormatError::UnsupportedCompression(codec)) if codec == "lz4"
        );

        let packed = zlib(&[1, 2, 3]);
        let xml = format!(
            r#"<xisf><Image geometry="2:1:1" sampleFormat="UInt8" compression="zlib:3" location="attachment:1024:{}"/></xisf>"#,
            packed.len()
        );
        assert_matches!(decode_xisf(&build(&xml, &packed, 1024)), Err(FormatError::InvalidXisf(_)));

        let xml = r#"<xisf><Image geometry="2:1:1" sampleFormat="UInt8" compression="zlib:2" location="attachment:1024:4"/></xisf>"#;
        assert_matches!(
            decode_xisf(&build(xml, b"junk", 1024)),
            Err(FormatError::InvalidXisf(msg)) if msg.contains("zlib")
        );
    }

    #[test]
    fn test_overflowing_geometry_rejected() {
        let xml = r#"<xisf><Image geometry="4294967296:4294967296:1" sampleFormat="Float32" location="attachment:1024:16"/></xisf>"#;
        assert_matches!(
            decode_xisf(&build(xml, &[0; 16], 1024)),
            Err(FormatError::InvalidXisf(msg)) if msg.contains("overflow")
        );

        let xml = format!(
            r#"<xisf><Image geometry="1:1:1" sampleFormat="UInt8" location="attachment:{}:16"/></xisf>"#,
            usize::MAX
        );
        assert_matches!(
            decode_xisf(&build(&xml, &[0; 16], 1024)),
            Err(FormatError::InvalidXisf(msg)) if msg.contains("truncated")
        );
    }

    #[test]
    fn test_short_attachment_rejected() {
        let xml = r#"<xisf><Image geometry="4:4:1" sampleFormat="Float32" location="attachment:1024:16"/></xisf>"#;
        assert_matches!(
            decode_xisf(&build(xml, &[0; 16], 1024)),
            Err(FormatError::InvalidXisf(msg)) if msg.contains("needs 64")
        );
    }

    #[test]
    fn test_rejects_unknown_sample_format() {
        let xml = r#"<xisf><Image geometry="1:1:1" sampleFormat="Complex64" location="attachment:1024:8"/></xisf>"#;
        assert_matches!(
            decode_xisf(&build(xml, &[0; 8], 1024)),
            Err(FormatError::UnsupportedSampleFormat(_))
        );
    }

    #[test]
    fn test_rejects_bad_signature_and_malformed_xml() {
        assert_matches!(decode_xisf(b"SIMPLE  = T     "), Err(FormatError::InvalidXisf(_)));

        let xml = r#"<xisf><Image geometry="1:1:1" sampleFormat="UInt8""#;
        assert_matches!(
            decode_xisf(&build(xml, &[0], 1024)),
            Err(FormatError::InvalidXisf(msg)) if msg.contains("malformed")
        );
    }

    #[test]
    fn test_skips_similarly_named_elements() {
        let xml = r#"<xisf><ImageInfo foo="bar"/><Image geometry="1:1:1" sampleFormat="UInt8" location="attachment:1024:1"/></xisf>"#;
        let (raw, _) = decode_xisf(&build(xml, &[3], 1024)).unwrap();
        assert_eq!(raw.pixels, vec![3.0]);
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.xisf");
        let image = Image::from_rows(&[[100.0, 40000.0]]).unwrap();

        write_xisf(&path, &image, &Header::new(), SampleFormat::Float64).unwrap();
        let (raw, _) = read_xisf(&path).unwrap();
        assert_eq!(raw.pixels, image.pixels());
    }
}
