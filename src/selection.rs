//! Query filter built from a media type flag

use crate::models::{MediaTypeCode, MediaTypeFlag};

/// Column of the media table holding the [`MediaTypeCode`]
pub const TYPE_COLUMN: &str = "type";

/// Row filter passed to the provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// No predicate: every row, including media types this client does not know
    #[default]
    All,
    /// Matches no row
    Nothing,
    /// `type = ?` clauses joined by OR, one per code, in clause order
    AnyOf(Vec<MediaTypeCode>),
}

impl Selection {
    /// Build the filter for a media type flag.
    ///
    /// All three bits select everything. Otherwise one clause per set bit is
    /// appended in AUDIO, VIDEO, IMAGE order. An empty flag selects nothing.
    pub fn from_flag(flag: MediaTypeFlag) -> Self {
        let flag = MediaTypeFlag::from_bits_truncate(flag.bits());
        if flag.contains(MediaTypeFlag::ALL) {
            return Selection::All;
        }

        let codes: Vec<MediaTypeCode> = MediaTypeCode::ORDERED
            .into_iter()
            .filter(|code| flag.contains(code.flag()))
            .collect();

        if codes.is_empty() {
            Selection::Nothing
        } else {
            Selection::AnyOf(codes)
        }
    }

    /// Individual predicate clauses, each with one positional placeholder
    pub fn clauses(&self) -> Vec<String> {
        match self {
            Selection::AnyOf(codes) => codes
                .iter()
                .map(|_| format!("{} = ?", TYPE_COLUMN))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Positional arguments, index-aligned with [`Selection::clauses`]
    pub fn args(&self) -> Vec<i64> {
        match self {
            Selection::AnyOf(codes) => codes.iter().map(|c| c.code()).collect(),
            _ => Vec::new(),
        }
    }

    /// SQL `WHERE` body, or `None` when every row is selected
    pub fn where_clause(&self) -> Option<String> {
        match self {
            Selection::All => None,
            Selection::Nothing => Some("0".to_string()),
            Selection::AnyOf(_) => Some(self.clauses().join(" OR ")),
        }
    }

    /// Evaluate the filter against a row's `type` value
    pub fn matches(&self, type_code: i64) -> bool {
        match self {
            Selection::All => true,
            Selection::Nothing => false,
            Selection::AnyOf(codes) => codes.iter().any(|c| c.code() == type_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_audio_video() {
        let selection = Selection::from_flag(MediaTypeFlag::AUDIO | MediaTypeFlag::VIDEO);
        assert_eq!(
            selection,
            Selection::AnyOf(vec![MediaTypeCode::Audio, MediaTypeCode::Video])
        );
        assert_eq!(selection.clauses(), vec!["type = ?", "type = ?"]);
        assert_eq!(selection.args(), vec![1, 2]);
        assert_eq!(selection.where_clause().as_deref(), Some("type = ? OR type = ?"));
    }

    #[test]
    fn test_all_selects_everything() {
        let selection = Selection::from_flag(MediaTypeFlag::ALL);
        assert_eq!(selection, Selection::All);
        assert!(selection.where_clause().is_none());
        assert!(selection.args().is_empty());
        // Codes this client does not know about still match
        assert!(selection.matches(9));
    }

    #[test]
    fn test_image_only() {
        let selection = Selection::from_flag(MediaTypeFlag::IMAGE);
        assert_eq!(selection.args(), vec![3]);
        assert_eq!(selection.where_clause().as_deref(), Some("type = ?"));
    }

    #[test]
    fn test_empty_flag_selects_nothing() {
        let selection = Selection::from_flag(MediaTypeFlag::NONE);
        assert_eq!(selection, Selection::Nothing);
        assert_eq!(selection.where_clause().as_deref(), Some("0"));
        assert!(selection.args().is_empty());
        for code in 0..5 {
            assert!(!selection.matches(code));
        }
    }

    #[test]
    fn test_unknown_bits_ignored() {
        let selection = Selection::from_flag(MediaTypeFlag::from_bits_truncate(0x09));
        assert_eq!(selection, Selection::AnyOf(vec![MediaTypeCode::Audio]));
    }

    proptest! {
        #[test]
        fn prop_all_bits_is_all(extra in any::<u8>()) {
            let flag = MediaTypeFlag::from_bits_truncate(extra) | MediaTypeFlag::ALL;
            prop_assert_eq!(Selection::from_flag(flag), Selection::All);
        }

        #[test]
        fn prop_all_bits_any_construction_order(order in Just(MediaTypeCode::ORDERED.to_vec()).prop_shuffle()) {
            let mut flag = MediaTypeFlag::NONE;
            for code in order {
                flag |= code.flag();
            }
            prop_assert_eq!(Selection::from_flag(flag), Selection::All);
        }

        #[test]
        fn prop_single_bit_matches_only_its_code(index in 0usize..3, probe in 0i64..8) {
            let code = MediaTypeCode::ORDERED[index];
            let selection = Selection::from_flag(code.flag());
            prop_assert_eq!(selection.args(), vec![code.code()]);
            prop_assert_eq!(selection.matches(probe), probe == code.code());
        }

        #[test]
        fn prop_clauses_and_args_aligned(bits in 0u8..8) {
            let flag = MediaTypeFlag::from_bits_truncate(bits);
            let selection = Selection::from_flag(flag);
            prop_assert_eq!(selection.clauses().len(), selection.args().len());

            if let Selection::AnyOf(codes) = &selection {
                let expected: Vec<i64> = MediaTypeCode::ORDERED
                    .iter()
                    .filter(|c| flag.contains(c.flag()))
                    .map(|c| c.code())
                    .collect();
                prop_assert_eq!(selection.args(), expected);
                prop_assert!(codes.len() < 3);
            }
        }
    }
}
