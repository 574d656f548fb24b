// src/bank.rs

//! Question bank interface consumed by the engine.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::question::{QuestionFilter, QuestionId, QuestionRecord},
    store::{DocumentStore, QUESTIONS},
};

/// Answer key entry for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub correct_option_index: usize,
    pub category_id: String,
}

/// Answer key for a set of questions. Questions missing from the bank have no entry.
pub type AnswerKey = HashMap<QuestionId, KeyEntry>;

#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn query_questions(&self, filter: &QuestionFilter) -> Result<Vec<QuestionRecord>, AppError>;

    /// Questions for the given ids, in the same order. Unknown ids are skipped.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<QuestionRecord>, AppError>;

    async fn answer_key(&self, ids: &[QuestionId]) -> Result<AnswerKey, AppError> {
        Ok(self
            .get_questions(ids)
            .await?
            .into_iter()
            .map(|q| {
                (
                    q.id,
                    KeyEntry {
                        correct_option_index: q.correct_option_index,
                        category_id: q.category_id,
                    },
                )
            })
            .collect())
    }
}

/// Question bank kept in the `questions` collection of the document store.
pub struct StoreQuestionBank {
    store: Arc<dyn DocumentStore>,
}

impl StoreQuestionBank {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Inserts or replaces a batch of questions.
    pub async fn import(&self, questions: &[QuestionRecord]) -> Result<usize, AppError> {
        for q in questions {
            self.store.save(QUESTIONS, &q.id, q).await?;
        }
        tracing::info!(count = questions.len(), "imported questions");
        Ok(questions.len())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.store.delete(QUESTIONS, id).await?)
    }
}

#[async_trait]
impl QuestionBank for StoreQuestionBank {
    async fn query_questions(&self, filter: &QuestionFilter) -> Result<Vec<QuestionRecord>, AppError> {
        // Narrow on the most selective indexed field, then intersect the rest.
        let candidates: Vec<QuestionRecord> = if let Some(subtopic) = &filter.subtopic_id {
            self.store.find_by(QUESTIONS, "subtopic_id", subtopic.as_str()).await?
        } else if let Some(topic) = &filter.topic_id {
            self.store.find_by(QUESTIONS, "topic_id", topic.as_str()).await?
        } else if let Some(subject) = &filter.subject_id {
            self.store.find_by(QUESTIONS, "subject_id", subject.as_str()).await?
        } else if let Some(category) = &filter.category_id {
            self.store.find_by(QUESTIONS, "category_id", category.as_str()).await?
        } else {
            self.store.list_all(QUESTIONS).await?
        };

        Ok(candidates.into_iter().filter(|q| filter.matches(q)).collect())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<QuestionRecord>, AppError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((q, _)) = self.store.load::<QuestionRecord>(QUESTIONS, id).await? {
                found.push(q);
            }
        }
        Ok(found)
    }
}
