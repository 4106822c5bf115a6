//! Declarative keyword tables for occupation, student level, worry and
//! emotion classification. Kept as data so the rules stay testable in
//! isolation and easy to extend.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupation {
    Student,
    Worker,
}

/// keyword -> occupation
const OCCUPATION_RULES: &[(&str, Occupation)] =
    &[("학생", Occupation::Student), ("직장", Occupation::Worker)];

/// keyword -> stored student-level label
const STUDENT_LEVEL_RULES: &[(&str, &str)] =
    &[("중", "중학생"), ("고", "고등학생"), ("대", "대학생")];

pub const WORRY_KEYWORDS: &[&str] = &["걱정", "불안", "스트레스"];

pub const EMOTION_TAGS: &[&str] = &["우울", "불안", "슬픔", "짜증", "외로움", "무기력"];

pub fn match_occupation(text: &str) -> Option<Occupation> {
    OCCUPATION_RULES
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|&(_, occupation)| occupation)
}

pub fn match_student_level(text: &str) -> Option<&'static str> {
    STUDENT_LEVEL_RULES
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|&(_, label)| label)
}

pub fn contains_worry(text: &str) -> bool {
    WORRY_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// First matching emotion tag, if any.
pub fn detect_emotion(text: &str) -> Option<&'static str> {
    EMOTION_TAGS.iter().find(|tag| text.contains(*tag)).copied()
}
