//! AICA lookup tables
//!
//! Shared constants used by the channel programmer.

/// Linear-to-logarithmic loudness curve (256 steps).
///
/// The channel programmer indexes the upper half of this table with
/// `128 + volume / 2` and subtracts the result from 255 to obtain the
/// chip's total-level attenuation. Existing content is mixed against these
/// exact values, so the table must not be regenerated from a formula.
pub const LOG_TABLE: [u8; 256] = [
    0, 15, 22, 27, 31, 35, 39, 42, 45, 47, 50, 52, 55, 57, 59, 61, //
    63, 65, 67, 69, 71, 73, 74, 76, 78, 79, 81, 82, 84, 85, 87, 88, //
    90, 91, 92, 94, 95, 96, 98, 99, 100, 102, 103, 104, 105, 106, 108, 109, //
    110, 111, 112, 113, 114, 116, 117, 118, 119, 120, 121, 122, 123, 124, 125, 126, //
    127, 128, 129, 130, 131, 132, 133, 134, 135, 136, 137, 138, 138, 139, 140, 141, //
    142, 143, 144, 145, 146, 146, 147, 148, 149, 150, 151, 152, 152, 153, 154, 155, //
    156, 156, 157, 158, 159, 160, 160, 161, 162, 163, 164, 164, 165, 166, 167, 167, //
    168, 169, 170, 170, 171, 172, 173, 173, 174, 175, 176, 176, 177, 178, 178, 179, //
    180, 181, 181, 182, 183, 183, 184, 185, 185, 186, 187, 187, 188, 189, 189, 190, //
    191, 191, 192, 193, 193, 194, 195, 195, 196, 197, 197, 198, 199, 199, 200, 200, //
    201, 202, 202, 203, 204, 204, 205, 205, 206, 207, 207, 208, 209, 209, 210, 210, //
    211, 212, 212, 213, 213, 214, 215, 215, 216, 216, 217, 217, 218, 219, 219, 220, //
    220, 221, 221, 222, 223, 223, 224, 224, 225, 225, 226, 227, 227, 228, 228, 229, //
    229, 230, 230, 231, 232, 232, 233, 233, 234, 234, 235, 235, 236, 236, 237, 237, //
    238, 239, 239, 240, 240, 241, 241, 242, 242, 243, 243, 244, 244, 245, 245, 246, //
    246, 247, 247, 248, 248, 249, 249, 250, 250, 251, 251, 252, 252, 253, 254, 255, //
];

/// Base rate of the pitch register (exponent 0, mantissa 0).
pub const BASE_RATE: u32 = 44_100;

/// Highest pitch exponent accepted by the chip.
pub const MAX_EXPONENT: i8 = 7;

/// Lowest pitch exponent accepted by the chip.
pub const MIN_EXPONENT: i8 = -8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_table_size() {
        assert_eq!(LOG_TABLE.len(), 256);
    }

    #[test]
    fn test_log_table_monotonic() {
        for i in 1..LOG_TABLE.len() {
            assert!(
                LOG_TABLE[i] >= LOG_TABLE[i - 1],
                "LOG_TABLE[{}] ({}) < LOG_TABLE[{}] ({})",
                i,
                LOG_TABLE[i],
                i - 1,
                LOG_TABLE[i - 1]
            );
        }
    }

    #[test]
    fn test_log_table_edges() {
        assert_eq!(LOG_TABLE[0], 0);
        assert_eq!(LOG_TABLE[128], 180);
        assert_eq!(LOG_TABLE[255], 255);
    }
}
