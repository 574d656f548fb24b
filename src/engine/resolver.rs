// src/engine/resolver.rs

use crate::{
    bank::QuestionBank,
    error::AppError,
    models::{
        question::{QuestionFilter, QuestionId},
        test_definition::SourcingConfig,
    },
};

/// Turns a sourcing configuration into an ordered candidate list.
///
/// Fixed sourcing returns its ids verbatim without touching the bank. Dynamic
/// sourcing queries the bank with the pool filter, then applies the
/// difficulty filter to that result, and returns the ids sorted so the same
/// bank contents always produce the same candidates.
pub async fn resolve_candidates(
    bank: &dyn QuestionBank,
    sourcing: &SourcingConfig,
) -> Result<Vec<QuestionId>, AppError> {
    match sourcing {
        SourcingConfig::Fixed { question_ids } => {
            if question_ids.is_empty() {
                return Err(AppError::InsufficientQuestions {
                    requested: 1,
                    available: 0,
                });
            }
            Ok(question_ids.clone())
        }
        SourcingConfig::Dynamic {
            pool,
            difficulty,
            count,
            ..
        } => {
            let filter = QuestionFilter::from(pool);
            let pooled = bank.query_questions(&filter).await?;

            let mut ids: Vec<QuestionId> = pooled
                .into_iter()
                .filter(|q| match difficulty {
                    Some(wanted) => q.difficulty.as_ref() == Some(wanted),
                    None => true,
                })
                .map(|q| q.id)
                .collect();
            ids.sort();
            ids.dedup();

            if ids.is_empty() {
                return Err(AppError::InsufficientQuestions {
                    requested: *count,
                    available: 0,
                });
            }

            tracing::debug!(candidates = ids.len(), requested = count, "resolved dynamic pool");
            Ok(ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        bank::{StoreQuestionBank, test_support::question},
        models::{question::Difficulty, test_definition::PoolSelector},
        store::MemoryStore,
    };

    async fn bank() -> StoreQuestionBank {
        let bank = StoreQuestionBank::new(Arc::new(MemoryStore::new()));
        let mut hard = question("h1", "math", 0);
        hard.difficulty = Some(Difficulty::Hard);
        bank.import(&[
            question("m2", "math", 0),
            question("m1", "math", 1),
            hard,
            question("x1", "history", 0),
        ])
        .await
        .unwrap();
        bank
    }

    fn dynamic(category: &str, difficulty: Option<Difficulty>) -> SourcingConfig {
        SourcingConfig::Dynamic {
            pool: PoolSelector {
                category_id: Some(category.into()),
                ..Default::default()
            },
            difficulty,
            count: 2,
            strict: false,
        }
    }

    #[tokio::test]
    async fn test_fixed_resolves_verbatim() {
        let bank = bank().await;
        let sourcing = SourcingConfig::Fixed {
            question_ids: vec!["z".into(), "m1".into()],
        };
        let ids = resolve_candidates(&bank, &sourcing).await.unwrap();
        assert_eq!(ids, vec!["z".to_string(), "m1".to_string()]);
    }

    #[tokio::test]
    async fn test_dynamic_is_sorted_and_difficulty_filtered() {
        let bank = bank().await;

        let all = resolve_candidates(&bank, &dynamic("math", None)).await.unwrap();
        assert_eq!(all, vec!["h1", "m1", "m2"]);

        let hard = resolve_candidates(&bank, &dynamic("math", Some(Difficulty::Hard)))
            .await
            .unwrap();
        assert_eq!(hard, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_empty_pool_is_reported() {
        let bank = bank().await;
        let err = resolve_candidates(&bank, &dynamic("biology", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientQuestions { requested: 2, available: 0 }
        ));

        let err = resolve_candidates(&bank, &dynamic("history", Some(Difficulty::Easy)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientQuestions { .. }));
    }
}
