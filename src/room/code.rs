use rand::Rng;

use crate::shared::AppError;

/// Room code alphabet without look-alike characters (no I, O, 0, 1)
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const MIN_CODE_LENGTH: usize = 4;
pub const MAX_CODE_LENGTH: usize = 8;

/// Trait for generating room codes
pub trait RoomCodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Uniformly random codes drawn from [`ROOM_CODE_ALPHABET`]
pub struct RandomRoomCodeGenerator;

impl RandomRoomCodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomRoomCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCodeGenerator for RandomRoomCodeGenerator {
    fn generate(&self, length: usize) -> String {
        let length = length.clamp(MIN_CODE_LENGTH, MAX_CODE_LENGTH);
        let mut rng = rand::rng();
        (0..length)
            .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Trims and upper-cases user input, then checks it looks like a room code
pub fn normalize_room_code(input: &str) -> Result<String, AppError> {
    let code = input.trim().to_ascii_uppercase();

    if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len()) {
        return Err(AppError::Validation(format!(
            "Room code must be {MIN_CODE_LENGTH}-{MAX_CODE_LENGTH} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(
            "Room code may only contain letters and digits".to_string(),
        ));
    }

    Ok(code)
}
