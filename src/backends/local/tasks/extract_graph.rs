// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::engine::context::RunContext;
use crate::errors::TaskError;
use crate::model::{GraphEdge, GraphNode, TaskData, WorkContent, WorkItem};
use crate::traits::{Task, TaskOutput};

pub const DEFAULT_RELATIONSHIP: &str = "mentioned_with";
pub const DEFAULT_MIN_ENTITY_LEN: usize = 2;

/// Heuristic entity and relationship extraction.
///
/// Runs of capitalized words become entities ("Ada Lovelace"); entities that
/// follow each other in a chunk are linked with `relationship`. The first word of
/// a sentence only counts when it is part of a longer run. Stateless, so it is
/// safe to run on several partitions at once.
pub struct ExtractGraphTask {
    name: String,
    min_entity_len: usize,
    relationship: String,
}

impl ExtractGraphTask {
    pub fn new(name: impl Into<String>, min_entity_len: usize, relationship: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_entity_len,
            relationship: relationship.into(),
        }
    }

    fn entities(&self, text: &str) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        let mut run: Vec<&str> = Vec::new();
        let mut sentence_start = true;

        let mut flush = |run: &mut Vec<&str>, starts_sentence: bool| {
            let take = !(starts_sentence && run.len() == 1);
            let name = run.join(" ");
            if take
                && name.chars().count() >= self.min_entity_len
                && !entities.iter().any(|e| e == &name)
            {
                entities.push(name);
            }
            run.clear();
        };

        let mut run_starts_sentence = false;
        for raw in text.split_whitespace() {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            let capitalized = word.chars().next().is_some_and(char::is_uppercase);
            if capitalized {
                if run.is_empty() {
                    run_starts_sentence = sentence_start;
                }
                run.push(word);
            } else if !run.is_empty() {
                flush(&mut run, run_starts_sentence);
            }
            sentence_start = raw.ends_with(['.', '!', '?']);
            if sentence_start && !run.is_empty() {
                flush(&mut run, run_starts_sentence);
            }
        }
        if !run.is_empty() {
            flush(&mut run, run_starts_sentence);
        }
        entities
    }

    fn extract(&self, item: WorkItem) -> WorkItem {
        let (text, vector) = match item.content.clone() {
            WorkContent::Text { text } => (text, None),
            WorkContent::Embedded { text, vector } => (text, Some(vector)),
            WorkContent::Graph { text, vector, .. } => (text, vector),
        };
        let nodes: Vec<GraphNode> = self
            .entities(&text)
            .into_iter()
            .map(|name| GraphNode {
                id: entity_id(&name),
                label: "Entity".into(),
                name,
            })
            .collect();
        let edges = nodes
            .windows(2)
            .map(|pair| GraphEdge {
                source: pair[0].id.clone(),
                target: pair[1].id.clone(),
                relationship: self.relationship.clone(),
            })
            .collect();
        item.derive(
            item.id.clone(),
            WorkContent::Graph {
                text,
                nodes,
                edges,
                vector,
            },
        )
    }
}

impl Default for ExtractGraphTask {
    fn default() -> Self {
        Self::new("extract_graph", DEFAULT_MIN_ENTITY_LEN, DEFAULT_RELATIONSHIP)
    }
}

fn entity_id(name: &str) -> String {
    format!("entity:{}", name.to_lowercase().replace(' ', "_"))
}

#[async_trait]
impl Task for ExtractGraphTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: TaskData, _ctx: &RunContext) -> Result<TaskOutput, TaskError> {
        let items = input.into_items().ok_or_else(|| {
            TaskError::MalformedInput("extract_graph expects work items".into())
        })?;
        Ok(TaskOutput::items(
            items.into_iter().map(|item| self.extract(item)).collect(),
        ))
    }
}
