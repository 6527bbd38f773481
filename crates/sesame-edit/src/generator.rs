//! Password generation and strength estimation.

use rand::seq::SliceRandom;
use zxcvbn::{zxcvbn, Score};

use crate::config::GeneratorConfig;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}:,./?";

/// Generate a random password from the configured character classes.
///
/// Every enabled class contributes at least one character (length
/// permitting). With no class enabled, lowercase is used.
pub fn generate_password(config: &GeneratorConfig) -> String {
    let mut classes: Vec<&[u8]> = Vec::new();
    if config.uppercase {
        classes.push(UPPER);
    }
    if config.lowercase {
        classes.push(LOWER);
    }
    if config.digits {
        classes.push(DIGITS);
    }
    if config.symbols {
        classes.push(SYMBOLS);
    }
    if classes.is_empty() {
        classes.push(LOWER);
    }

    let mut rng = rand::thread_rng();
    let mut chars: Vec<u8> = Vec::with_capacity(config.length);

    for class in &classes {
        if chars.len() >= config.length {
            break;
        }
        if let Some(c) = class.choose(&mut rng) {
            chars.push(*c);
        }
    }
    let pool = classes.concat();
    while chars.len() < config.length {
        match pool.choose(&mut rng) {
            Some(c) => chars.push(*c),
            None => break,
        }
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).unwrap_or_default()
}

/// Score a password and name the bucket it lands in.
pub fn password_strength(password: &str) -> (Score, &'static str) {
    if password.is_empty() {
        return (Score::Zero, "Empty");
    }
    let entropy = zxcvbn(password, &[]);
    let label = match entropy.score() {
        Score::Zero => "Very Weak",
        Score::One => "Weak",
        Score::Two => "Fair",
        Score::Three => "Strong",
        Score::Four => "Very Strong",
        _ => "Unknown",
    };
    (entropy.score(), label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_covers_enabled_classes() {
        let config = GeneratorConfig {
            length: 32,
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
        };
        let password = generate_password(&config);

        assert_eq!(password.len(), 32);
        assert!(password.bytes().any(|b| UPPER.contains(&b)));
        assert!(password.bytes().any(|b| LOWER.contains(&b)));
        assert!(password.bytes().any(|b| DIGITS.contains(&b)));
        assert!(password.bytes().any(|b| SYMBOLS.contains(&b)));
    }

    #[test]
    fn no_enabled_class_falls_back_to_lowercase() {
        let config = GeneratorConfig {
            length: 12,
            uppercase: false,
            lowercase: false,
            digits: false,
            symbols: false,
        };
        let password = generate_password(&config);

        assert_eq!(password.len(), 12);
        assert!(password.bytes().all(|b| LOWER.contains(&b)));
    }

    #[test]
    fn zero_length_yields_empty_password() {
        let config = GeneratorConfig {
            length: 0,
            ..GeneratorConfig::default()
        };
        assert_eq!(generate_password(&config), "");
    }

    #[test]
    fn strength_buckets_are_labeled() {
        assert_eq!(password_strength(""), (Score::Zero, "Empty"));

        let (score, label) = password_strength("password");
        assert_eq!(score, Score::Zero);
        assert_eq!(label, "Very Weak");

        let (_, label) = password_strength(&generate_password(&GeneratorConfig::default()));
        assert!(matches!(label, "Strong" | "Very Strong"));
    }
}
