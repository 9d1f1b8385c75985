//! CLI command implementations.
//!
//! Each `run_*` function backs one `assist` subcommand, loads what it needs
//! from the config, and prints its result to stdout.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::cache::ResponseCache;
use crate::chat::{ChatReply, ChatService};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db;
use crate::documents::{count_documents, save_document, search_documents};
use crate::embedding::create_provider;
use crate::lectures::{read_lectures_file, LectureSource, SqliteLectureStore};
use crate::migrate::apply_schema;
use crate::models::Role;
use crate::transcript::Transcript;

async fn open_pool(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

fn open_transcript(config: &Config) -> Transcript {
    let now = SystemClock.now_utc();
    match config.chat.transcript_path {
        Some(ref path) => Transcript::open(path, config.chat.transcript_limit, now),
        None => Transcript::in_memory(config.chat.transcript_limit, now),
    }
}

// ============ lectures ============

pub async fn run_lectures_import(config: &Config, path: &Path) -> Result<()> {
    let lectures = read_lectures_file(path)?;
    let pool = open_pool(config).await?;
    let store = SqliteLectureStore::new(pool);
    let inserted = store.insert_lectures(&lectures).await?;
    let total = store.count().await?;

    println!("imported {} lectures from {}", inserted, path.display());
    println!("  total lectures: {}", total);
    store.pool().close().await;
    Ok(())
}

pub async fn run_lectures_list(config: &Config, limit: Option<i64>) -> Result<()> {
    let pool = open_pool(config).await?;
    let store = SqliteLectureStore::new(pool);
    let lectures = store
        .fetch(limit.unwrap_or(config.chat.lecture_fetch_limit))
        .await?;

    if lectures.is_empty() {
        println!("No lectures stored.");
    }
    for (idx, l) in lectures.iter().enumerate() {
        println!(
            "{}. {} | {} {} | {} | {} | {} | {}",
            idx + 1,
            l.lecture_title,
            l.day,
            l.lecture_time,
            l.instructor,
            l.room,
            l.department,
            l.level
        );
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_lectures_clear(config: &Config) -> Result<()> {
    let pool = open_pool(config).await?;
    let store = SqliteLectureStore::new(pool);
    let removed = store.clear().await?;
    println!("removed {} lectures", removed);
    store.pool().close().await;
    Ok(())
}

// ============ chat ============

async fn ask_and_record(
    service: &ChatService,
    transcript: &mut Transcript,
    question: &str,
) -> Result<ChatReply> {
    let reply = service.answer(question).await;
    let now = service.clock().now_utc();
    transcript.push(Role::User, question.trim(), now);
    transcript.push(Role::Assistant, &reply.answer, now);
    transcript.save()?;
    Ok(reply)
}

pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let pool = open_pool(config).await?;
    let service = ChatService::from_config(config, pool.clone())?;
    let mut transcript = open_transcript(config);

    let reply = ask_and_record(&service, &mut transcript, question).await?;
    println!("{}", reply.answer);
    eprintln!("[source: {}]", reply.source.as_str());

    pool.close().await;
    Ok(())
}

/// Interactive loop over stdin. Ends on EOF, `exit`, or `quit`.
pub async fn run_chat(config: &Config) -> Result<()> {
    let pool = open_pool(config).await?;
    let service = ChatService::from_config(config, pool.clone())?;
    let mut transcript = open_transcript(config);

    if let Some(last) = transcript.messages().last() {
        println!("{}", last.text);
    }

    let stdin = BufReader::new(tokio::io::stdin());
    chat_loop(&service, &mut transcript, stdin, &mut std::io::stdout()).await?;

    pool.close().await;
    Ok(())
}

/// Answer one question per input line until EOF, `exit`, or `quit`.
/// Returns how many questions were answered.
async fn chat_loop<R, W>(
    service: &ChatService,
    transcript: &mut Transcript,
    input: R,
    out: &mut W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut answered = 0;
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        let reply = ask_and_record(service, transcript, question).await?;
        writeln!(out, "{}\n", reply.answer)?;
        answered += 1;
    }
    Ok(answered)
}

pub fn run_history(config: &Config, clear: bool) -> Result<()> {
    let mut transcript = open_transcript(config);
    if clear {
        transcript.clear(SystemClock.now_utc())?;
        println!("Transcript cleared.");
        return Ok(());
    }

    for message in transcript.messages() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!(
            "[{}] {}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            who,
            message.text
        );
    }
    Ok(())
}

// ============ cache ============

fn open_response_cache(config: &Config) -> Option<ResponseCache> {
    let ttl = config.chat.response_ttl();
    config
        .chat
        .response_cache_path
        .as_ref()
        .map(|path| ResponseCache::open(path, ttl, Utc::now()))
}

pub fn run_cache_clear(config: &Config) -> Result<()> {
    match open_response_cache(config) {
        Some(cache) => {
            cache.clear()?;
            println!("Response cache cleared.");
        }
        None => println!("No response cache path configured; nothing to clear."),
    }
    Ok(())
}

pub fn run_cache_stats(config: &Config) -> Result<()> {
    match open_response_cache(config) {
        Some(cache) => {
            let stats = cache.stats(Utc::now());
            println!("response cache");
            println!("  entries: {}", stats.entries);
            println!("  fresh: {}", stats.fresh);
            println!("  ttl: {}s", config.chat.response_cache_ttl_secs);
        }
        None => println!("No response cache path configured; cache is in-memory only."),
    }
    Ok(())
}

// ============ docs ============

pub async fn run_docs_add(config: &Config, content: &str, source: Option<String>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config.");
    }
    let provider = create_provider(&config.embedding)?;
    let pool = open_pool(config).await?;

    let metadata = match source {
        Some(source) => json!({ "source": source }),
        None => json!({}),
    };
    let saved = save_document(&pool, provider.as_ref(), content, metadata).await?;
    if saved.created {
        println!("stored document {}", saved.document.id);
    } else {
        println!("document already stored as {}", saved.document.id);
    }
    println!("  total documents: {}", count_documents(&pool).await?);

    pool.close().await;
    Ok(())
}

pub async fn run_docs_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config.");
    }
    let provider = create_provider(&config.embedding)?;
    let pool = open_pool(config).await?;

    let results = search_documents(&pool, provider.as_ref(), query, limit).await?;
    if results.is_empty() {
        println!("No documents found.");
    }
    for (idx, m) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", idx + 1, m.score, m.id);
        println!("   {}", m.content);
    }

    pool.close().await;
    Ok(())
}
