//! GFF3 format adapter
//!
//! Zero-copy parsing of annotation records and formatting of
//! reconstructed calls. GFF uses 1-based closed coordinates; conversion
//! to half-open happens at the call sites.

use crate::core::coords::Strand;
use memchr::memchr;
use thiserror::Error;

/// Header line of every written annotation
pub const GFF3_HEADER: &str = "##gff-version   3";

/// Source column of every written annotation
pub const SOURCE_TAG: &str = "genowin";

const COLUMNS: usize = 9;

/// Why a GFF3 line could not be read
#[derive(Debug, Clone, Error)]
pub enum GffParseError {
    #[error("line is empty")]
    EmptyLine,
    #[error("expected 9 tab-separated columns, got {0}")]
    TooFewFields(usize),
    #[error("column {0} is not UTF-8")]
    InvalidUtf8(&'static str),
    #[error("column {0} is not a position: {1:?}")]
    InvalidNumber(&'static str, String),
    #[error("unknown strand {0:?}")]
    InvalidStrand(String),
    #[error("bad range {start}..{end}")]
    InvalidRange { start: u64, end: u64 },
}

/// Borrowed view of one GFF3 record
///
/// Only the columns used for labelling are kept. `start` and `end` are
/// the 1-based closed values as written in the file.
pub struct GffRecordView<'a> {
    pub seqname: &'a str,
    pub feature: &'a str,
    pub start: u64,
    pub end: u64,
    /// None for `.` and `?`
    pub strand: Option<Strand>,
    pub attributes: &'a str,
}

fn column<'a>(raw: &'a [u8], name: &'static str) -> Result<&'a str, GffParseError> {
    std::str::from_utf8(raw).map_err(|_| GffParseError::InvalidUtf8(name))
}

fn position(raw: &[u8], name: &'static str) -> Result<u64, GffParseError> {
    let text = column(raw, name)?;
    text.parse()
        .map_err(|_| GffParseError::InvalidNumber(name, text.to_string()))
}

impl<'a> GffRecordView<'a> {
    pub fn parse(line: &'a [u8]) -> Result<Self, GffParseError> {
        if line.is_empty() {
            return Err(GffParseError::EmptyLine);
        }

        // Tabs inside the attribute column stay part of it
        let mut cols: [&'a [u8]; COLUMNS] = [&[]; COLUMNS];
        let mut rest = line;
        let mut found = 0;
        while found < COLUMNS - 1 {
            let Some(tab) = memchr(b'\t', rest) else { break };
            cols[found] = &rest[..tab];
            rest = &rest[tab + 1..];
            found += 1;
        }
        cols[found] = rest;
        found += 1;
        if found < COLUMNS {
            return Err(GffParseError::TooFewFields(found));
        }

        let start = position(cols[3], "start")?;
        let end = position(cols[4], "end")?;
        if start == 0 || end < start {
            return Err(GffParseError::InvalidRange { start, end });
        }

        let strand = match cols[6] {
            b"." | b"?" => None,
            [c] => Some(
                Strand::from_char(*c as char)
                    .ok_or_else(|| GffParseError::InvalidStrand((*c as char).to_string()))?,
            ),
            other => {
                return Err(GffParseError::InvalidStrand(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };

        Ok(Self {
            seqname: column(cols[0], "seqname")?,
            feature: column(cols[2], "feature")?,
            start,
            end,
            strand,
            attributes: column(cols[8], "attributes")?,
        })
    }

    /// Half-open 0-based start
    pub fn start0(&self) -> u64 {
        self.start - 1
    }

    /// `Order=` attribute value
    pub fn order(&self) -> Option<&'a str> {
        attribute_order(self.attributes)
    }

    /// `Superfamily=` attribute value
    pub fn superfamily(&self) -> Option<&'a str> {
        attribute_superfamily(self.attributes)
    }
}

/// Value of `Order=`, up to the next `;` or `/`
pub fn attribute_order(attributes: &str) -> Option<&str> {
    attribute_value(attributes, "Order=", &[';', '/'])
}

/// Value of `Superfamily=`, up to the next `;`
pub fn attribute_superfamily(attributes: &str) -> Option<&str> {
    attribute_value(attributes, "Superfamily=", &[';'])
}

fn attribute_value<'a>(attributes: &'a str, key: &str, stops: &[char]) -> Option<&'a str> {
    let start = attributes.find(key)? + key.len();
    let rest = &attributes[start..];
    let value = &rest[..rest.find(stops).unwrap_or(rest.len())];
    (!value.is_empty()).then_some(value)
}

/// One reconstructed feature call, 1-based closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GffCall {
    pub chrom: String,
    pub feature: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    /// Order and superfamily display names for TE calls
    pub te: Option<(String, String)>,
}

impl GffCall {
    /// Format as a GFF3 line with a synthetic identifier
    pub fn to_line(&self, id: usize) -> String {
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t.\t{}\t.\tID={}_{}",
            self.chrom, SOURCE_TAG, self.feature, self.start, self.end, self.strand, SOURCE_TAG, id
        );
        if let Some((order, superfamily)) = &self.te {
            line.push_str(&format!(";Order={};Superfamily={}", order, superfamily));
        }
        line
    }
}
