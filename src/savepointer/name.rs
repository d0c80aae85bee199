use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

/// Number of random bytes in a savepoint name, the size of a UUID.
const SAVEPOINT_NUM_BYTES: usize = 16;

/// Generates a practically unique savepoint name.
///
/// The name is 22 characters of unpadded standard base64. It may contain `+`
/// and `/`, so providers must quote it.
pub fn generate_name() -> String {
    let bytes: [u8; SAVEPOINT_NUM_BYTES] = rand::random();
    STANDARD_NO_PAD.encode(bytes)
}
