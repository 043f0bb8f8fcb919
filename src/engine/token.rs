use rand::RngCore;

const TOKEN_BYTES: usize = 32;

pub fn confirmation_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tokens_are_long_and_distinct() {
        let tokens: HashSet<String> = (0..256).map(|_| confirmation_token()).collect();
        assert_eq!(tokens.len(), 256);
        assert!(tokens.iter().all(|t| t.len() == TOKEN_BYTES * 2));
        assert!(tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_hexdigit())));
    }
}
