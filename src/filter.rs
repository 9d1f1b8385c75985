//! Keyword lecture filter.
//!
//! Narrows the cached timetable to the lectures a question is about. Two
//! passes:
//!
//! 1. **Targeted**: recognize a day, level, and/or department in the query
//!    (see [`KeywordTables`]) and keep lectures whose labels match every
//!    recognized value. Returns up to [`TARGETED_LIMIT`] lectures in cache
//!    order.
//! 2. **General**: when the targeted pass recognizes nothing or matches
//!    nothing, score each lecture by how many query terms its text contains
//!    and return the best [`GENERAL_LIMIT`].
//!
//! Scoring per term found in a lecture's haystack:
//!
//! | Occurrence | Weight |
//! |------------|--------|
//! | surrounded by spaces, or at the start or end | 3 |
//! | anywhere else | 1 |

use crate::keywords::{KeywordEntry, KeywordTables};
use crate::models::Lecture;

pub const TARGETED_LIMIT: usize = 10;
pub const GENERAL_LIMIT: usize = 5;

const MIN_QUERY_CHARS: usize = 2;
const MIN_TERM_CHARS: usize = 3;

const BOUNDED_WEIGHT: u32 = 3;
const SUBSTRING_WEIGHT: u32 = 1;

/// Values recognized in a query by the targeted pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTargets {
    pub day: Option<KeywordEntry>,
    pub level: Option<KeywordEntry>,
    pub department: Option<KeywordEntry>,
}

impl QueryTargets {
    pub fn is_empty(&self) -> bool {
        self.day.is_none() && self.level.is_none() && self.department.is_none()
    }

    fn accepts(&self, lecture: &Lecture) -> bool {
        let check = |target: &Option<KeywordEntry>, label: &str| {
            target.as_ref().map_or(true, |t| t.matches_label(label))
        };
        check(&self.day, &lecture.day)
            && check(&self.level, &lecture.level)
            && check(&self.department, &lecture.department)
    }
}

/// Extract day / level / department from a normalized query.
///
/// A "today" token overrides any weekday named in the query.
pub fn extract_targets(query: &str, today: &str, tables: &KeywordTables) -> QueryTargets {
    let day = if tables.mentions_today(query) {
        Some(tables.day_entry(today))
    } else {
        tables.recognize_day(query).cloned()
    };

    QueryTargets {
        day,
        level: tables.recognize_level(query).cloned(),
        department: tables.recognize_department(query).cloned(),
    }
}

/// Return the lectures relevant to `query`, most relevant first.
///
/// `today` is the canonical name of the current weekday.
pub fn search_lectures(
    query: &str,
    lectures: &[Lecture],
    today: &str,
    tables: &KeywordTables,
) -> Vec<Lecture> {
    let query = query.trim().to_lowercase();
    if query.chars().count() < MIN_QUERY_CHARS || lectures.is_empty() {
        return Vec::new();
    }

    let targets = extract_targets(&query, today, tables);
    if !targets.is_empty() {
        let matched: Vec<Lecture> = lectures
            .iter()
            .filter(|l| targets.accepts(l))
            .take(TARGETED_LIMIT)
            .cloned()
            .collect();
        if !matched.is_empty() {
            return matched;
        }
    }

    score_lectures(&query, lectures, tables)
}

/// Split a normalized query into scoring terms.
pub fn query_terms<'a>(query: &'a str, tables: &KeywordTables) -> Vec<&'a str> {
    query
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_TERM_CHARS && !tables.is_stop_word(w))
        .collect()
}

/// Score of a single haystack against the query terms.
pub fn term_score(haystack: &str, terms: &[&str]) -> u32 {
    terms
        .iter()
        .copied()
        .filter(|term| haystack.contains(term))
        .map(|term| {
            let padded = format!(" {} ", term);
            if haystack.contains(&padded) || haystack.starts_with(term) || haystack.ends_with(term)
            {
                BOUNDED_WEIGHT
            } else {
                SUBSTRING_WEIGHT
            }
        })
        .sum()
}

fn score_lectures(query: &str, lectures: &[Lecture], tables: &KeywordTables) -> Vec<Lecture> {
    let terms = query_terms(query, tables);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(u32, &Lecture)> = lectures
        .iter()
        .map(|l| (term_score(&l.haystack(), &terms), l))
        .filter(|(score, _)| *score > 0)
        .collect();

    // sort_by is stable: equal scores keep cache order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(GENERAL_LIMIT)
        .map(|(_, l)| l.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture(title: &str, day: &str, level: &str, department: &str) -> Lecture {
        Lecture {
            lecture_title: title.to_string(),
            day: day.to_string(),
            level: level.to_string(),
            department: department.to_string(),
            ..Lecture::default()
        }
    }

    fn titles(lectures: &[Lecture]) -> Vec<&str> {
        lectures.iter().map(|l| l.lecture_title.as_str()).collect()
    }

    #[test]
    fn test_today_query_uses_current_weekday() {
        let tables = KeywordTables::default();
        let lectures = vec![
            lecture("Algorithms", "الأحد", "", ""),
            lecture("Databases", "الاثنين", "", ""),
            lecture("Networks", "الأحد", "", ""),
        ];
        let result = search_lectures("محاضرات اليوم", &lectures, "الأحد", &tables);
        assert_eq!(titles(&result), vec!["Algorithms", "Networks"]);
    }

    #[test]
    fn test_today_overrides_named_day() {
        let tables = KeywordTables::default();
        let targets = extract_targets("محاضرات الاثنين اليوم", "الخميس", &tables);
        assert_eq!(targets.day.unwrap().canonical, "الخميس");
    }

    #[test]
    fn test_named_day_filters_only_that_day() {
        let tables = KeywordTables::default();
        let lectures = vec![
            lecture("Algorithms", "الأحد", "", ""),
            lecture("Databases", "الاثنين", "", ""),
            lecture("Compilers", "يوم الاثنين", "", ""),
        ];
        let result = search_lectures("ما هي محاضرات الاثنين", &lectures, "الأحد", &tables);
        assert_eq!(titles(&result), vec!["Databases", "Compilers"]);
    }

    #[test]
    fn test_blank_labels_never_match_a_target() {
        let tables = KeywordTables::default();
        let lectures = vec![
            lecture("Physics", "", "", ""),
            lecture("Chemistry", "  ", "  ", "  "),
            lecture("Algorithms", "الأحد", "المستوى الأول", "علوم حاسوب"),
        ];

        let result = search_lectures("محاضرات الأحد", &lectures, "الاثنين", &tables);
        assert_eq!(titles(&result), vec!["Algorithms"]);

        let result = search_lectures("المستوى الأول", &lectures, "الاثنين", &tables);
        assert_eq!(titles(&result), vec!["Algorithms"]);

        // only blank-day lectures left: nothing is targeted or scored
        let result = search_lectures("محاضرات السبت", &lectures[..2], "الاثنين", &tables);
        assert!(result.is_empty());
    }

    #[test]
    fn test_combined_filters_are_conjunctive() {
        let tables = KeywordTables::default();
        let lectures = vec![
            lecture("A", "الأحد", "المستوى الأول", "علوم حاسوب"),
            lecture("B", "الأحد", "المستوى الثاني", "علوم حاسوب"),
            lecture("C", "الاثنين", "المستوى الأول", "علوم حاسوب"),
            lecture("D", "الأحد", "الأول", "تقنية معلومات"),
        ];
        let result = search_lectures(
            "محاضرات الأحد مستوى اول حاسوب",
            &lectures,
            "الخميس",
            &tables,
        );
        assert_eq!(titles(&result), vec!["A"]);
    }

    #[test]
    fn test_targeted_results_capped() {
        let tables = KeywordTables::default();
        let lectures: Vec<Lecture> = (0..15)
            .map(|i| lecture(&format!("L{}", i), "السبت", "", ""))
            .collect();
        let result = search_lectures("السبت", &lectures, "الأحد", &tables);
        assert_eq!(result.len(), TARGETED_LIMIT);
        assert_eq!(result[0].lecture_title, "L0");
        assert_eq!(result[9].lecture_title, "L9");
    }

    #[test]
    fn test_short_query_returns_nothing() {
        let tables = KeywordTables::default();
        let lectures = vec![lecture("A", "الأحد", "", "")];
        assert!(search_lectures(" a ", &lectures, "الأحد", &tables).is_empty());
        assert!(search_lectures("", &lectures, "الأحد", &tables).is_empty());
    }

    #[test]
    fn test_empty_lecture_list() {
        let tables = KeywordTables::default();
        assert!(search_lectures("محاضرات اليوم", &[], "الأحد", &tables).is_empty());
    }

    #[test]
    fn test_falls_back_to_scoring_when_filter_matches_nothing() {
        let tables = KeywordTables::default();
        let lectures = vec![
            Lecture {
                lecture_title: "شبكات".to_string(),
                instructor: "د. سالم".to_string(),
                day: "الأحد".to_string(),
                ..Lecture::default()
            },
            Lecture {
                lecture_title: "قواعد بيانات".to_string(),
                instructor: "د. سالم".to_string(),
                day: "الاثنين".to_string(),
                ..Lecture::default()
            },
        ];
        // Friday matches nothing, so the instructor name drives the result
        let result = search_lectures("الجمعة سالم", &lectures, "الأحد", &tables);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_scoring_weights() {
        assert_eq!(term_score("data structures lab", &["data"]), 3);
        assert_eq!(term_score("data structures lab", &["lab"]), 3);
        assert_eq!(term_score("data structures lab", &["structures"]), 3);
        assert_eq!(term_score("datastructures", &["struct"]), 1);
        assert_eq!(term_score("data structures lab", &["data", "uct"]), 4);
        assert_eq!(term_score("data structures lab", &["physics"]), 0);
    }

    #[test]
    fn test_scored_results_sorted_and_zero_excluded() {
        let tables = KeywordTables::default();
        let lectures = vec![
            lecture("advanced networking", "", "", ""),
            lecture("physics", "", "", ""),
            lecture("networks lab", "", "", ""),
        ];
        let result = search_lectures("network lab", &lectures, "الأحد", &tables);
        assert_eq!(titles(&result), vec!["networks lab", "advanced networking"]);
    }

    #[test]
    fn test_scored_ties_keep_cache_order() {
        let tables = KeywordTables::default();
        let lectures = vec![
            lecture("compiler design", "", "", ""),
            lecture("operating systems design", "", "", ""),
            lecture("graphics design", "", "", ""),
        ];
        let result = search_lectures("design", &lectures, "الأحد", &tables);
        assert_eq!(
            titles(&result),
            vec!["compiler design", "operating systems design", "graphics design"]
        );
    }

    #[test]
    fn test_scored_results_capped() {
        let tables = KeywordTables::default();
        let lectures: Vec<Lecture> = (0..8)
            .map(|i| lecture(&format!("seminar {}", i), "", "", ""))
            .collect();
        let result = search_lectures("seminar", &lectures, "الأحد", &tables);
        assert_eq!(result.len(), GENERAL_LIMIT);
    }

    #[test]
    fn test_only_stop_words_yields_nothing() {
        let tables = KeywordTables::default();
        let lectures = vec![lecture("متى", "", "", "")];
        assert!(search_lectures("متى أين", &lectures, "الأحد", &tables).is_empty());
    }

    #[test]
    fn test_query_terms_drop_short_and_stop_words() {
        let tables = KeywordTables::default();
        let terms = query_terms("أين محاضرة الشبكات في القاعة ab", &tables);
        assert_eq!(terms, vec!["محاضرة", "الشبكات", "القاعة"]);
    }
}
