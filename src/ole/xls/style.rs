//! Fonts, cell formats (XF) and number formats
//!
//! Cells reference an XF record by index and the XF references a FONT and
//! a FORMAT by index. Font indices skip 4: the fifth FONT record in the
//! stream has index 5.

use bitflags::bitflags;

use crate::common::binary;
use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::xls::records::{FONT, FORMAT, Record, XF};
use crate::ole::xls::strings;

/// First index available to workbook-defined number formats
pub const FIRST_CUSTOM_FORMAT: u16 = 164;

/// Most XF records Excel accepts in one workbook
pub const MAX_STYLES: usize = 4050;

/// Highest usable FONT index
pub const MAX_FONT_INDEX: usize = 511;

/// Index of a FONT record as cells and XFs refer to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FontId(pub u16);

impl FontId {
    /// Index for the font stored at `position` among FONT records
    pub fn from_position(position: usize) -> Self {
        let index = if position < 4 { position } else { position + 1 };
        FontId(index as u16)
    }

    /// Position among FONT records, `None` for the reserved index 4
    pub fn position(self) -> Option<usize> {
        match self.0 {
            4 => None,
            i if i < 4 => Some(i as usize),
            i => Some(i as usize - 1),
        }
    }
}

/// Index of an XF record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StyleId(pub u16);

bitflags! {
    /// FONT option flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct FontOptions: u16 {
        const ITALIC = 0x0002;
        const STRIKEOUT = 0x0008;
        const OUTLINE = 0x0010;
        const SHADOW = 0x0020;
        const CONDENSE = 0x0040;
        const EXTEND = 0x0080;
    }
}

/// Weight of a normal font; 700 is bold
pub const WEIGHT_NORMAL: u16 = 400;

/// FONT record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    /// Height in twips
    pub height: u16,
    pub options: FontOptions,
    /// Palette color index
    pub color: u16,
    pub weight: u16,
    /// Superscript / subscript
    pub escapement: u16,
    pub underline: u8,
    pub family: u8,
    pub charset: u8,
    pub name: String,
}

impl Default for Font {
    fn default() -> Self {
        Font {
            height: 200,
            options: FontOptions::empty(),
            color: 0x7FFF,
            weight: WEIGHT_NORMAL,
            escapement: 0,
            underline: 0,
            family: 0,
            charset: 0,
            name: "Arial".to_string(),
        }
    }
}

impl Font {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 16 {
            return Err(XlsError::InvalidLength {
                expected: 16,
                found: data.len(),
            });
        }
        let (name, _) = strings::read_short_unicode_string(data, 14)?;
        Ok(Font {
            height: binary::read_u16_le(data, 0)?,
            options: FontOptions::from_bits_retain(binary::read_u16_le(data, 2)?),
            color: binary::read_u16_le(data, 4)?,
            weight: binary::read_u16_le(data, 6)?,
            escapement: binary::read_u16_le(data, 8)?,
            underline: data[10],
            family: data[11],
            charset: data[12],
            name,
        })
    }

    pub fn is_italic(&self) -> bool {
        self.options.contains(FontOptions::ITALIC)
    }

    /// A default font carrying only the attributes that survive a copy:
    /// weight, color, height, name, italic and underline
    pub fn clone_visual(&self) -> Font {
        let mut options = FontOptions::empty();
        options.set(FontOptions::ITALIC, self.is_italic());
        Font {
            height: self.height,
            options,
            color: self.color,
            weight: self.weight,
            underline: self.underline,
            name: self.name.clone(),
            ..Font::default()
        }
    }

    pub fn to_record(&self) -> XlsResult<Record> {
        let mut data = Vec::with_capacity(16 + self.name.len() * 2);
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&self.options.bits().to_le_bytes());
        data.extend_from_slice(&self.color.to_le_bytes());
        data.extend_from_slice(&self.weight.to_le_bytes());
        data.extend_from_slice(&self.escapement.to_le_bytes());
        data.push(self.underline);
        data.push(self.family);
        data.push(self.charset);
        data.push(0);
        strings::write_short_unicode_string(&mut data, &self.name)?;
        Ok(Record::new(FONT, data))
    }
}

bitflags! {
    /// Low four bits of an XF's type/protection word
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct XfProtection: u16 {
        const LOCKED = 0x0001;
        const HIDDEN = 0x0002;
        /// Style XF rather than cell XF
        const STYLE = 0x0004;
        const LOTUS_PREFIX = 0x0008;
    }
}

/// "Attribute used" bits of a cell XF (byte 9), all set
const USED_ATTRIBUTES: u8 = 0xFC;

/// XF record
///
/// Alignment, border and fill bytes are kept as stored; the font, number
/// format and parent are the parts that change when a format moves between
/// workbooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStyle {
    pub font: FontId,
    pub format: u16,
    pub protection: XfProtection,
    /// Parent style XF (12 bits)
    pub parent: u16,
    /// Bytes 6..20 of the record
    pub attributes: [u8; 14],
}

impl CellStyle {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 20 {
            return Err(XlsError::InvalidLength {
                expected: 20,
                found: data.len(),
            });
        }
        let type_word = binary::read_u16_le(data, 4)?;
        let mut attributes = [0u8; 14];
        attributes.copy_from_slice(&data[6..20]);
        Ok(CellStyle {
            font: FontId(binary::read_u16_le(data, 0)?),
            format: binary::read_u16_le(data, 2)?,
            protection: XfProtection::from_bits_truncate(type_word),
            parent: type_word >> 4,
            attributes,
        })
    }

    pub fn is_style_xf(&self) -> bool {
        self.protection.contains(XfProtection::STYLE)
    }

    /// Cell XF for another workbook: same appearance, new font and format,
    /// parented to the Normal style
    ///
    /// Every "attribute used" bit is set so the copy does not inherit from
    /// a parent style it no longer has.
    pub fn rebased(&self, font: FontId, format: u16) -> CellStyle {
        let mut attributes = self.attributes;
        attributes[3] |= USED_ATTRIBUTES;
        CellStyle {
            font,
            format,
            protection: self.protection - XfProtection::STYLE,
            parent: 0,
            attributes,
        }
    }

    pub fn to_record(&self) -> Record {
        let mut data = Vec::with_capacity(20);
        data.extend_from_slice(&self.font.0.to_le_bytes());
        data.extend_from_slice(&self.format.to_le_bytes());
        let type_word = (self.parent << 4) | self.protection.bits();
        data.extend_from_slice(&type_word.to_le_bytes());
        data.extend_from_slice(&self.attributes);
        Record::new(XF, data)
    }
}

/// FORMAT record: number format string and its index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub index: u16,
    pub code: String,
}

impl NumberFormat {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        let index = binary::read_u16_le(data, 0)?;
        let (code, _) = strings::read_unicode_string(data, 2)?;
        Ok(NumberFormat { index, code })
    }

    pub fn is_builtin(index: u16) -> bool {
        index < FIRST_CUSTOM_FORMAT
    }

    pub fn to_record(&self) -> XlsResult<Record> {
        let mut data = Vec::with_capacity(5 + self.code.len() * 2);
        data.extend_from_slice(&self.index.to_le_bytes());
        strings::write_unicode_string(&mut data, &self.code)?;
        Ok(Record::new(FORMAT, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_index_skips_four() {
        assert_eq!(FontId::from_position(3), FontId(3));
        assert_eq!(FontId::from_position(4), FontId(5));
        assert_eq!(FontId(5).position(), Some(4));
        assert_eq!(FontId(4).position(), None);
        assert_eq!(FontId(0).position(), Some(0));
    }

    #[test]
    fn test_font_round_trip() {
        let font = Font {
            height: 240,
            options: FontOptions::ITALIC | FontOptions::STRIKEOUT,
            color: 10,
            weight: 700,
            escapement: 1,
            underline: 1,
            family: 2,
            charset: 134,
            name: "宋体".to_string(),
        };
        let record = font.to_record().unwrap();
        assert_eq!(Font::parse(&record.data).unwrap(), font);
    }

    #[test]
    fn test_clone_visual_keeps_six_attributes() {
        let font = Font {
            height: 240,
            options: FontOptions::ITALIC | FontOptions::STRIKEOUT,
            color: 10,
            weight: 700,
            escapement: 1,
            underline: 1,
            family: 2,
            charset: 134,
            name: "Calibri".to_string(),
        };
        let copy = font.clone_visual();
        assert_eq!(copy.height, 240);
        assert_eq!(copy.color, 10);
        assert_eq!(copy.weight, 700);
        assert_eq!(copy.underline, 1);
        assert_eq!(copy.name, "Calibri");
        assert_eq!(copy.options, FontOptions::ITALIC);
        assert_eq!(copy.escapement, 0);
        assert_eq!(copy.charset, 0);
    }

    #[test]
    fn test_rebased_style() {
        let mut data = vec![0u8; 20];
        data[0..2].copy_from_slice(&6u16.to_le_bytes());
        data[2..4].copy_from_slice(&170u16.to_le_bytes());
        // locked, parent 3
        data[4..6].copy_from_slice(&((3u16 << 4) | 1).to_le_bytes());
        data[6] = 0x21;
        data[9] = 0x04;
        let style = CellStyle::parse(&data).unwrap();
        assert_eq!(style.parent, 3);
        assert!(!style.is_style_xf());

        let copy = style.rebased(FontId(9), 165);
        assert_eq!(copy.parent, 0);
        assert_eq!(copy.protection, XfProtection::LOCKED);
        assert_eq!(copy.attributes[0], 0x21);
        assert_eq!(copy.attributes[3], 0xFC);

        let record = copy.to_record();
        assert_eq!(&record.data[0..2], &9u16.to_le_bytes());
        assert_eq!(&record.data[2..4], &165u16.to_le_bytes());
        assert_eq!(CellStyle::parse(&record.data).unwrap(), copy);
    }

    #[test]
    fn test_format_record() {
        let format = NumberFormat {
            index: 164,
            code: "0.000%".to_string(),
        };
        let record = format.to_record().unwrap();
        assert_eq!(NumberFormat::parse(&record.data).unwrap(), format);
        assert!(NumberFormat::is_builtin(14));
        assert!(!NumberFormat::is_builtin(164));
    }
}
