//! Romanization of display names.
//!
//! Every source character decomposes into one syllable: Han characters map to
//! their toneless pinyin reading (first reading for heteronyms), everything
//! else (digits, Latin letters, punctuation) passes through as itself. Both
//! keys are therefore total, deterministic, and idempotent on already
//! romanized input.

use pinyin::ToPinyin;

/// One decomposed unit of a display name.
enum Syllable {
    Romanized(pinyin::Pinyin),
    PassThrough(char),
}

fn syllables(name: &str) -> impl Iterator<Item = Syllable> + '_ {
    name.chars().map(|ch| match ch.to_pinyin() {
        Some(p) => Syllable::Romanized(p),
        None => Syllable::PassThrough(ch),
    })
}

/// Full transliteration key: syllables concatenated without separators.
///
/// `阿莫西林胶囊` → `amoxilinjiaonang`, `维生素C片` → `weishengsuCpian`.
pub fn full_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() * 2);
    for syllable in syllables(name) {
        match syllable {
            Syllable::Romanized(p) => key.push_str(p.plain()),
            Syllable::PassThrough(ch) => key.push(ch),
        }
    }
    key
}

/// Initials key: the first letter of every syllable.
///
/// `阿莫西林胶囊` → `amxljn`. The result has exactly [`syllable_count`] chars.
pub fn initials_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for syllable in syllables(name) {
        match syllable {
            Syllable::Romanized(p) => {
                if let Some(first) = p.first_letter().chars().next() {
                    key.push(first);
                }
            }
            Syllable::PassThrough(ch) => key.push(ch),
        }
    }
    key
}

/// Number of syllables a name decomposes into (one per character).
pub fn syllable_count(name: &str) -> usize {
    name.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn romanizes_han_characters_without_separators() {
        assert_eq!(full_key("张三"), "zhangsan");
        assert_eq!(full_key("阿莫西林胶囊"), "amoxilinjiaonang");
        assert_eq!(full_key("布洛芬片"), "buluofenpian");
    }

    #[test]
    fn initials_keep_first_letter_per_syllable() {
        assert_eq!(initials_key("张三"), "zs");
        assert_eq!(initials_key("阿莫西林胶囊"), "amxljn");
        assert_eq!(initials_key("布洛芬片"), "blfp");
    }

    #[test]
    fn unconvertible_characters_pass_through() {
        assert_eq!(full_key("维生素C片"), "weishengsuCpian");
        assert_eq!(full_key("0.25g*24粒"), "0.25g*24li");
        assert_eq!(initials_key("0.25g*24粒"), "0.25g*24l");
        assert_eq!(full_key("ibuprofen"), "ibuprofen");
    }

    #[test]
    fn empty_input_yields_empty_keys() {
        assert_eq!(full_key(""), "");
        assert_eq!(initials_key(""), "");
        assert_eq!(syllable_count(""), 0);
    }

    #[test]
    fn initials_length_equals_syllable_count() {
        for name in ["阿莫西林胶囊", "感冒灵颗粒", "维生素C片", "10g*20袋", "张三"] {
            assert_eq!(initials_key(name).chars().count(), syllable_count(name), "{name}");
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: keys are pure functions of the name.
            #[test]
            fn keys_are_deterministic(name in "[\u{4e00}-\u{9fa5}A-Za-z0-9*. ]{0,16}") {
                prop_assert_eq!(full_key(&name), full_key(&name));
                prop_assert_eq!(initials_key(&name), initials_key(&name));
            }

            /// Property: re-applying either key to its own output is a no-op.
            #[test]
            fn keys_are_idempotent(name in "[\u{4e00}-\u{9fa5}A-Za-z0-9*. ]{0,16}") {
                let full = full_key(&name);
                prop_assert_eq!(full_key(&full), full.clone());
                let initials = initials_key(&name);
                prop_assert_eq!(initials_key(&initials), initials.clone());
            }

            /// Property: one initial per decomposed syllable.
            #[test]
            fn initials_track_syllables(name in "[\u{4e00}-\u{9fa5}a-z0-9]{0,16}") {
                prop_assert_eq!(initials_key(&name).chars().count(), syllable_count(&name));
            }
        }
    }
}
