//! Answering a student's question.
//!
//! [`ChatService::answer`] always produces a displayable reply:
//!
//! 1. A fresh cached answer for the same (normalized) question is returned
//!    without touching the lecture store or the model.
//! 2. Otherwise the lecture cache is refreshed if stale, the keyword filter
//!    picks the relevant lectures, and a prompt goes to the generator.
//! 3. Generated text is cached and returned. On failure, errors that allow
//!    it are answered with a plain listing of the matched lectures; anything
//!    else becomes a fixed explanatory message. Neither is cached.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::clock::{arabic_weekday, Clock, SystemClock};
use crate::config::Config;
use crate::filter::search_lectures;
use crate::generation::{create_generator, GenerationError, TextGenerator};
use crate::keywords::KeywordTables;
use crate::lectures::{LectureCache, SqliteLectureStore};
use crate::models::Lecture;
use crate::prompt::{build_prompt, render_listing, ListingHeading};

const BLANK_QUESTION_MESSAGE: &str = "يرجى كتابة سؤالك.";

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Cache,
    Generated,
    Fallback,
    Error,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Cache => "cache",
            ReplySource::Generated => "generated",
            ReplySource::Fallback => "fallback",
            ReplySource::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub answer: String,
    pub source: ReplySource,
}

impl ChatReply {
    fn new(answer: impl Into<String>, source: ReplySource) -> Self {
        Self {
            answer: answer.into(),
            source,
        }
    }
}

pub struct ChatService {
    lectures: LectureCache,
    responses: ResponseCache,
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
    keywords: KeywordTables,
}

impl ChatService {
    pub fn new(
        lectures: LectureCache,
        responses: ResponseCache,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        keywords: KeywordTables,
    ) -> Self {
        Self {
            lectures,
            responses,
            generator,
            clock,
            keywords,
        }
    }

    /// Wire the production service: SQLite lectures, the configured
    /// generator, the system clock, and a response cache persisted when
    /// `chat.response_cache_path` is set.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let chat = &config.chat;

        let lectures = LectureCache::new(
            Arc::new(SqliteLectureStore::new(pool)),
            chat.lecture_ttl(),
            chat.lecture_fetch_limit,
        );
        let responses = response_cache_from_config(config, clock.as_ref());
        let generator: Arc<dyn TextGenerator> = Arc::from(create_generator(&config.generation)?);

        info!(model = generator.model_name(), "chat service ready");
        Ok(Self::new(
            lectures,
            responses,
            generator,
            clock,
            config.keywords.clone(),
        ))
    }

    pub fn responses(&self) -> &ResponseCache {
        &self.responses
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The cached timetable, refreshed if stale.
    pub async fn lectures(&self) -> Arc<Vec<Lecture>> {
        self.lectures.get(self.clock.as_ref()).await
    }

    /// Drop the cached timetable so the next question rereads the store.
    pub async fn reload_lectures(&self) {
        self.lectures.invalidate().await;
    }

    pub async fn answer(&self, question: &str) -> ChatReply {
        let question = question.trim();
        if question.is_empty() {
            return ChatReply::new(BLANK_QUESTION_MESSAGE, ReplySource::Error);
        }

        if let Some(cached) = self.responses.get(question, self.clock.now_utc()) {
            debug!("answer served from cache");
            return ChatReply::new(cached, ReplySource::Cache);
        }

        let lectures = self.lectures().await;
        let now = self.clock.now();
        let today = arabic_weekday(&now);
        let matched = search_lectures(question, &lectures, today, &self.keywords);
        debug!(
            total = lectures.len(),
            matched = matched.len(),
            today,
            "filtered lectures"
        );

        let prompt = build_prompt(question, &matched, lectures.len(), &now);

        match self.generator.generate(&prompt).await {
            Ok(generated) => {
                self.responses
                    .insert(question, &generated.text, self.clock.now_utc());
                ChatReply::new(generated.text, ReplySource::Generated)
            }
            Err(err) => self.recover(err, &matched, today),
        }
    }

    fn recover(&self, err: GenerationError, matched: &[Lecture], today: &str) -> ChatReply {
        if err.allows_listing_fallback() && !matched.is_empty() {
            info!(error = %err, matched = matched.len(), "answering with lecture listing");
            let heading = match err {
                GenerationError::Overloaded => ListingHeading::Today(today),
                _ => ListingHeading::General,
            };
            return ChatReply::new(render_listing(matched, heading), ReplySource::Fallback);
        }

        warn!(error = %err, "generation failed");
        ChatReply::new(err.user_message(), ReplySource::Error)
    }
}

fn response_cache_from_config(config: &Config, clock: &dyn Clock) -> ResponseCache {
    let ttl = config.chat.response_ttl();
    match config.chat.response_cache_path {
        Some(ref path) => ResponseCache::open(path, ttl, clock.now_utc()),
        None => ResponseCache::in_memory(ttl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::generation::GeneratedText;
    use crate::lectures::InMemoryLectures;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays queued results and records every prompt.
    struct ScriptedGenerator {
        results: Mutex<Vec<Result<GeneratedText, GenerationError>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(results: Vec<Result<GeneratedText, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<GeneratedText, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(GenerationError::Empty))
        }
    }

    fn ok(text: &str) -> Result<GeneratedText, GenerationError> {
        Ok(GeneratedText {
            text: text.to_string(),
            truncated: false,
        })
    }

    fn timetable() -> Vec<Lecture> {
        vec![
            Lecture {
                lecture_title: "Algorithms".to_string(),
                day: "الأحد".to_string(),
                lecture_time: "08:00".to_string(),
                ..Lecture::default()
            },
            Lecture {
                lecture_title: "Databases".to_string(),
                day: "الاثنين".to_string(),
                ..Lecture::default()
            },
        ]
    }

    fn service(generator: Arc<ScriptedGenerator>) -> (ChatService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        ));
        let service = ChatService::new(
            LectureCache::new(
                Arc::new(InMemoryLectures::new(timetable())),
                Duration::minutes(10),
                100,
            ),
            ResponseCache::in_memory(Duration::hours(1)),
            generator,
            clock.clone(),
            KeywordTables::default(),
        );
        (service, clock)
    }

    #[tokio::test]
    async fn test_generated_answer_is_cached() {
        let generator = ScriptedGenerator::new(vec![ok("**محاضرات اليوم** 📚")]);
        let (service, clock) = service(generator.clone());

        let first = service.answer("محاضرات اليوم").await;
        assert_eq!(first.source, ReplySource::Generated);

        clock.advance(Duration::minutes(30));
        let second = service.answer("  محاضرات اليوم ").await;
        assert_eq!(second.source, ReplySource::Cache);
        assert_eq!(second.answer, first.answer);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_calls_generator_again() {
        let generator = ScriptedGenerator::new(vec![ok("a"), ok("b")]);
        let (service, clock) = service(generator.clone());

        service.answer("سؤال عام").await;
        clock.advance(Duration::minutes(61));
        let reply = service.answer("سؤال عام").await;
        assert_eq!(reply.answer, "b");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prompt_carries_today_and_matches() {
        let generator = ScriptedGenerator::new(vec![ok("x")]);
        let (service, _clock) = service(generator.clone());
        service.answer("محاضرات اليوم").await;

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("اليوم هو الأحد"));
        assert!(prompts[0].contains("1. Algorithms | الأحد 08:00"));
        assert!(!prompts[0].contains("Databases"));
    }

    #[tokio::test]
    async fn test_overload_with_matches_lists_today() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::Overloaded)]);
        let (service, _clock) = service(generator);

        let reply = service.answer("محاضرات اليوم").await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.answer.contains("**المحاضرات المتاحة لليوم (الأحد):**"));
        assert!(reply.answer.contains("1. **Algorithms** 📚"));
        assert!(!reply.answer.contains("Databases"));
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::Empty), ok("later")]);
        let (service, _clock) = service(generator.clone());

        let first = service.answer("محاضرات الأحد").await;
        assert_eq!(first.source, ReplySource::Fallback);
        assert!(first.answer.contains("**المحاضرات المتاحة:**"));

        let second = service.answer("محاضرات الأحد").await;
        assert_eq!(second.source, ReplySource::Generated);
        assert_eq!(second.answer, "later");
    }

    #[tokio::test]
    async fn test_overload_without_matches_explains() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::Overloaded)]);
        let (service, _clock) = service(generator);

        let reply = service.answer("محاضرات الجمعة").await;
        assert_eq!(reply.source, ReplySource::Error);
        assert_eq!(reply.answer, GenerationError::Overloaded.user_message());
    }

    #[tokio::test]
    async fn test_blocked_never_falls_back() {
        let generator =
            ScriptedGenerator::new(vec![Err(GenerationError::Blocked("SAFETY".to_string()))]);
        let (service, _clock) = service(generator);

        let reply = service.answer("محاضرات اليوم").await;
        assert_eq!(reply.source, ReplySource::Error);
        assert!(reply.answer.contains("تم حظر الرد"));
    }

    #[tokio::test]
    async fn test_missing_credential_message() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::MissingCredential)]);
        let (service, _clock) = service(generator);
        let reply = service.answer("محاضرات اليوم").await;
        assert_eq!(reply.answer, GenerationError::MissingCredential.user_message());
    }

    #[tokio::test]
    async fn test_blank_question_skips_everything() {
        let generator = ScriptedGenerator::new(vec![]);
        let (service, _clock) = service(generator.clone());
        let reply = service.answer("   ").await;
        assert_eq!(reply.source, ReplySource::Error);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
