//! Cell values and their text rendering

use crate::ole::xls::style::StyleId;

/// Broad cell category used when copying a cell between workbooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Text,
    Number,
    Boolean,
    Formula,
    /// Blanks, errors and formulas that cannot be copied verbatim
    Other,
}

/// Last computed result of a formula
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(u8),
    Empty,
}

/// A FORMULA cell
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    /// CellParsedFormula as stored: `cce`, the tokens, then any trailing data
    pub parsed: Vec<u8>,
    pub cached: CachedValue,
    /// Option flags (always-calc, shared formula, ...)
    pub options: u16,
    /// Whether the tokens can be copied into another workbook unchanged
    pub portable: bool,
}

impl Formula {
    /// Set when the formula belongs to a shared-formula range
    pub const SHARED: u16 = 0x0008;
}

/// Value held by a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Formula(Formula),
    Error(u8),
    Blank,
}

impl CellValue {
    pub fn kind(&self) -> CellKind {
        match self {
            CellValue::Text(_) => CellKind::Text,
            CellValue::Number(_) => CellKind::Number,
            CellValue::Boolean(_) => CellKind::Boolean,
            CellValue::Formula(f) if f.portable => CellKind::Formula,
            CellValue::Formula(_) | CellValue::Error(_) | CellValue::Blank => CellKind::Other,
        }
    }

    /// Render the value as text
    ///
    /// Formulas render their cached result. Integral numbers print without
    /// a fractional part; other numbers use the shortest round-trip form.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Boolean(b) => format_bool(*b),
            CellValue::Error(code) => error_text(*code).to_string(),
            CellValue::Blank => String::new(),
            CellValue::Formula(f) => match &f.cached {
                CachedValue::Number(n) => format_number(*n),
                CachedValue::Text(s) => s.clone(),
                CachedValue::Boolean(b) => format_bool(*b),
                CachedValue::Error(code) => error_text(*code).to_string(),
                CachedValue::Empty => String::new(),
            },
        }
    }
}

fn format_bool(value: bool) -> String {
    let text = if value { "TRUE" } else { "FALSE" };
    text.to_string()
}

/// Format a number the way a general-format cell shows it
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        let mut buf = itoa::Buffer::new();
        buf.format(value as i64).to_string()
    } else {
        let mut buf = ryu::Buffer::new();
        buf.format(value).to_string()
    }
}

/// Display text of a BIFF error code
pub fn error_text(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERR!",
    }
}

/// Decode an RK number
///
/// Bit 0 divides by 100, bit 1 selects a 30-bit signed integer over the
/// upper 30 bits of an IEEE double.
pub fn rk_to_f64(rk: u32) -> f64 {
    let value = if rk & 0x02 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
    };
    if rk & 0x01 != 0 { value / 100.0 } else { value }
}

/// A cell and the format it is displayed with
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub col: u16,
    pub value: CellValue,
    pub style: StyleId,
}
