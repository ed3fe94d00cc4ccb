//! Parsed-formula (`rgce`) token walking
//!
//! A FORMULA record stores its expression as a sequence of BIFF8 parse
//! tokens (Ptgs). Most tokens are self-contained; some index tables that
//! live elsewhere in the source workbook (defined names, the external sheet
//! table) or point at other records (shared and array formulas). Only a
//! formula made entirely of self-contained tokens can be copied into a
//! different workbook byte for byte.

use crate::common::binary;
use crate::ole::xls::error::{XlsError, XlsResult};

/// Why a formula cannot be copied verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// PtgExp / PtgTbl: body lives in a SHRFMLA, ARRAY or TABLE record
    SharedBody,
    /// PtgName / PtgNameX: index into the NAME or SUPBOOK tables
    DefinedName,
    /// 3-D references index the EXTERNSHEET table
    ExternSheet,
    /// Token this walker does not size
    Unknown(u8),
}

/// Size in bytes of a token's payload, or the dependency it carries
fn token_payload(ptg: u8, rgce: &[u8], at: usize) -> XlsResult<Result<usize, Dependency>> {
    let size = match ptg {
        0x01 | 0x02 => return Ok(Err(Dependency::SharedBody)),
        // Operators, parentheses and missing argument
        0x03..=0x16 => 0,
        // PtgStr: ShortXLUnicodeString
        0x17 => {
            let cch = binary::read_u8(rgce, at)? as usize;
            let flags = binary::read_u8(rgce, at + 1)?;
            2 + if flags & 0x01 != 0 { cch * 2 } else { cch }
        },
        // PtgAttr; tAttrChoose carries a jump table
        0x19 => {
            let grbit = binary::read_u8(rgce, at)?;
            if grbit & 0x04 != 0 {
                let count = binary::read_u16_le(rgce, at + 1)? as usize;
                3 + (count + 1) * 2
            } else {
                3
            }
        },
        0x1C | 0x1D => 1,
        0x1E => 2,
        0x1F => 8,
        0x20..=0x7F => match (ptg & 0x1F) | 0x20 {
            0x20 => 7,
            0x21 => 2,
            0x22 => 3,
            0x23 | 0x39 => return Ok(Err(Dependency::DefinedName)),
            0x24 | 0x2A | 0x2C => 4,
            0x25 | 0x2B | 0x2D => 8,
            0x26..=0x28 => 6,
            0x29 => 2,
            0x3A..=0x3D => return Ok(Err(Dependency::ExternSheet)),
            _ => return Ok(Err(Dependency::Unknown(ptg))),
        },
        other => return Ok(Err(Dependency::Unknown(other))),
    };
    Ok(Ok(size))
}

/// Find the first token that ties a formula to its source workbook
///
/// # Arguments
///
/// * `rgce` - The token stream, without its leading length
///
/// # Returns
///
/// `None` when every token is self-contained
pub fn first_dependency(rgce: &[u8]) -> XlsResult<Option<Dependency>> {
    let mut at = 0;
    while at < rgce.len() {
        let ptg = rgce[at];
        match token_payload(ptg, rgce, at + 1)? {
            Ok(size) => at += 1 + size,
            Err(dependency) => return Ok(Some(dependency)),
        }
    }
    if at != rgce.len() {
        return Err(XlsError::InvalidData(
            "formula token overruns its expression".to_string(),
        ));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_local_formula() {
        // =A1+B1*2 : PtgRef, PtgRef, PtgInt, PtgMul, PtgAdd
        let rgce = [
            0x24, 0x00, 0x00, 0x00, 0xC0, 0x24, 0x00, 0x00, 0x01, 0xC0, 0x1E, 0x02, 0x00, 0x05,
            0x03,
        ];
        assert_eq!(first_dependency(&rgce).unwrap(), None);
    }

    #[test]
    fn test_string_and_function_tokens() {
        // =LEN("ab") : PtgStr, PtgFunc(LEN)
        let rgce = [0x17, 0x02, 0x00, b'a', b'b', 0x41, 0x20, 0x00];
        assert_eq!(first_dependency(&rgce).unwrap(), None);
    }

    #[test]
    fn test_shared_formula_reference() {
        let rgce = [0x01, 0x05, 0x00, 0x02, 0x00];
        assert_eq!(first_dependency(&rgce).unwrap(), Some(Dependency::SharedBody));
    }

    #[test]
    fn test_cross_sheet_reference() {
        // PtgRef3d in value class
        let rgce = [0x5A, 0x00, 0x00, 0x03, 0x00, 0x01, 0xC0];
        assert_eq!(first_dependency(&rgce).unwrap(), Some(Dependency::ExternSheet));
    }

    #[test]
    fn test_defined_name() {
        let rgce = [0x43, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(first_dependency(&rgce).unwrap(), Some(Dependency::DefinedName));
    }

    #[test]
    fn test_truncated_token() {
        assert!(first_dependency(&[0x17, 0x05, 0x00, b'a']).is_err());
        assert!(first_dependency(&[0x1F, 0x00, 0x00]).is_err());
    }
}
