//! Chat assistant over stored detection records
//!
//! Simple append-only log per record: the user message and the generated
//! reply are both persisted. When the text-generation service is down the
//! reply degrades to a deterministic summary built from the record's
//! statistics, so the assistant always answers.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::generate::TextGenerator;
use crate::pipeline::record::{compute_stats, DetectionRecord, DetectionStats};
use crate::storage::DetectionStore;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

/// One entry in a record's chat log.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: i64,
    pub detection_id: i64,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Chat assistant bound to a store and an optional generation service.
pub struct ChatService<'a> {
    store: &'a DetectionStore,
    generator: Option<&'a dyn TextGenerator>,
    timeout: Duration,
    max_tokens: u32,
}

impl<'a> ChatService<'a> {
    pub fn new(
        store: &'a DetectionStore,
        generator: Option<&'a dyn TextGenerator>,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            store,
            generator,
            timeout,
            max_tokens,
        }
    }

    /// Append the user message, produce a reply, append and return it.
    pub fn send(
        &self,
        detection_id: i64,
        message: &str,
        priority_labels: &[String],
    ) -> Result<ChatMessage> {
        let record = self.store.get(detection_id)?;
        let stats = compute_stats(&record.objects, priority_labels);

        self.store
            .append_message(detection_id, ChatRole::User, message)?;

        let reply = self.generate_reply(&record, &stats, message);

        let stored = self
            .store
            .append_message(detection_id, ChatRole::Assistant, &reply)?;

        Ok(stored)
    }

    fn generate_reply(
        &self,
        record: &DetectionRecord,
        stats: &DetectionStats,
        question: &str,
    ) -> String {
        if let Some(generator) = self.generator {
            let prompt = chat_prompt(record, stats, question);
            match generator.complete(&prompt, self.max_tokens, self.timeout) {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => warn!("Generation returned empty chat reply, using summary"),
                Err(err) => warn!("Chat generation failed, using summary: {err}"),
            }
        }

        fallback_reply(stats)
    }
}

/// Prompt for the assistant, carrying the detection summary as context.
fn chat_prompt(record: &DetectionRecord, stats: &DetectionStats, question: &str) -> String {
    let mut summary = String::new();
    for object in &record.objects {
        summary.push_str(&format!(
            "- {} ({:.0}% confidence): {}\n",
            object.label,
            object.confidence * 100.0,
            object.context
        ));
    }
    if summary.is_empty() {
        summary.push_str("- no objects detected\n");
    }

    format!(
        "You are a space station operations assistant answering questions \
         about an equipment scan.\n\
         Scan of {image}: {total} objects, average confidence {avg:.0}%.\n\
         Detected objects:\n{summary}\
         Question: {question}",
        image = record.image_url,
        total = stats.total_objects,
        avg = stats.average_confidence * 100.0,
        summary = summary,
        question = question,
    )
}

/// Deterministic reply used when generation is unavailable.
fn fallback_reply(stats: &DetectionStats) -> String {
    if stats.total_objects == 0 {
        return "No equipment was detected in this scan.".to_string();
    }

    let categories: Vec<String> = stats
        .category_counts
        .iter()
        .map(|(label, count)| format!("{count} {label}"))
        .collect();

    let mut reply = format!(
        "This scan contains {} objects ({}), average confidence {:.0}%.",
        stats.total_objects,
        categories.join(", "),
        stats.average_confidence * 100.0
    );

    if let Some(best) = &stats.highest_confidence_object {
        reply.push_str(&format!(
            " Strongest detection: {} at {:.0}%.",
            best.label,
            best.confidence * 100.0
        ));
    }

    if stats.priority_objects_detected > 0 {
        reply.push_str(&format!(
            " {} priority equipment item(s) present.",
            stats.priority_objects_detected
        ));
    }

    reply
}
