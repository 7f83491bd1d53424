//! Key and model rotation for a single provider
//!
//! For each candidate model, in order, a provider gets at most one attempt per key. A rate limit
//! moves on to the next key; when every key is rate limited on a model, the next model gets a
//! fresh budget. Any other error ends the rotation immediately: only quota signals are
//! considered recoverable by switching keys or models.
use crate::credentials::{Credential, KeyRotator};
use crate::errors::GenerationError;
use std::future::Future;
use tracing::{debug, warn};

/// Run `attempt` over every (model, key) pair until one succeeds.
///
/// `attempt` receives owned copies of the key and model so that the returned future does not
/// borrow from the rotator.
pub async fn rotate<F, Fut>(
    provider: &str,
    rotator: &KeyRotator,
    models: &[String],
    mut attempt: F,
) -> Result<String, GenerationError>
where
    F: FnMut(Credential, String) -> Fut,
    Fut: Future<Output = Result<String, GenerationError>>,
{
    let budget = rotator.len();
    if budget == 0 || models.is_empty() {
        return Err(GenerationError::NotConfigured {
            provider: provider.to_owned(),
        });
    }

    let mut attempts = 0;
    let mut last_error = None;

    for model in models {
        debug!(provider, model = %model, "Trying model");

        for n in 1..=budget {
            let Some((slot, key)) = rotator.next() else {
                break;
            };
            attempts += 1;
            debug!(
                provider,
                model = %model,
                key = %key,
                slot,
                "Attempt {}/{}",
                n,
                budget
            );

            match attempt(key.clone(), model.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_rate_limit() => {
                    warn!(provider, model = %model, key = %key, "Rate limited: {}", e);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(provider, model = %model, key = %key, "Attempt failed: {}", e);
                    return Err(e);
                }
            }
        }

        warn!(provider, model = %model, "All keys rate limited, falling back to next model");
    }

    Err(GenerationError::AllCredentialsExhausted {
        provider: provider.to_owned(),
        attempts,
        last: Box::new(
            last_error.unwrap_or_else(|| GenerationError::rate_limited(provider, "no attempts made")),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSet;
    use std::sync::Mutex;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|m| m.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_rate_limited_uses_n_attempts_per_model() {
        let rotator = KeyRotator::new(CredentialSet::parse("k1,k2,k3"));
        let calls = Mutex::new(Vec::new());

        let result = rotate("Gemini", &rotator, &models(&["m1", "m2"]), |key, model| {
            calls
                .lock()
                .unwrap()
                .push((key.expose().to_string(), model));
            async { Err(GenerationError::rate_limited("Gemini", "429")) }
        })
        .await;

        match result {
            Err(GenerationError::AllCredentialsExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 6);
                assert!(last.is_rate_limit());
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }

        let calls = calls.into_inner().unwrap();
        let expected: Vec<(String, String)> = [
            ("k1", "m1"),
            ("k2", "m1"),
            ("k3", "m1"),
            ("k1", "m2"),
            ("k2", "m2"),
            ("k3", "m2"),
        ]
        .iter()
        .map(|(k, m)| (k.to_string(), m.to_string()))
        .collect();
        assert_eq!(calls, expected);

        // Advanced N x models = 6 times, which is 0 mod 3.
        assert_eq!(rotator.position(), 0);
    }

    #[tokio::test]
    async fn test_success_on_kth_attempt_stops() {
        let rotator = KeyRotator::new(CredentialSet::parse("k1,k2,k3,k4"));
        let mut calls = 0;

        let result = rotate("Groq", &rotator, &models(&["m1"]), |key, _model| {
            calls += 1;
            async move {
                if key.expose() == "k3" {
                    Ok("third time lucky".to_string())
                } else {
                    Err(GenerationError::rate_limited("Groq", "429"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "third time lucky");
        assert_eq!(calls, 3);
        assert_eq!(rotator.position(), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_is_fatal() {
        let rotator = KeyRotator::new(CredentialSet::parse("k1,k2"));
        let mut calls = 0;

        let result = rotate("Groq", &rotator, &models(&["m1", "m2"]), |_key, _model| {
            calls += 1;
            async { Err(GenerationError::upstream("Groq", Some(401), "bad key")) }
        })
        .await;

        assert!(matches!(
            result,
            Err(GenerationError::Upstream {
                status: Some(401),
                ..
            })
        ));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model_after_rate_limits() {
        let rotator = KeyRotator::new(CredentialSet::parse("k1,k2"));

        let result = rotate("Gemini", &rotator, &models(&["m1", "m2"]), |_key, model| async move {
            if model == "m2" {
                Ok(format!("answer from {model}"))
            } else {
                Err(GenerationError::rate_limited("Gemini", "RESOURCE_EXHAUSTED"))
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer from m2");
        // Two rate limited attempts on m1 plus one success on m2.
        assert_eq!(rotator.position(), 1);
    }

    #[tokio::test]
    async fn test_cursor_is_not_reset_between_calls() {
        let rotator = KeyRotator::new(CredentialSet::parse("k1,k2,k3"));

        let first = rotate("P", &rotator, &models(&["m"]), |key, _| async move {
            Ok(key.expose().to_string())
        })
        .await
        .unwrap();
        let second = rotate("P", &rotator, &models(&["m"]), |key, _| async move {
            Ok(key.expose().to_string())
        })
        .await
        .unwrap();

        assert_eq!(first, "k1");
        assert_eq!(second, "k2");
    }

    #[tokio::test]
    async fn test_empty_keys_is_not_configured() {
        let rotator = KeyRotator::new(CredentialSet::default());
        let mut calls = 0;

        let result = rotate("P", &rotator, &models(&["m"]), |_, _| {
            calls += 1;
            async { Ok(String::new()) }
        })
        .await;

        assert!(matches!(result, Err(GenerationError::NotConfigured { .. })));
        assert_eq!(calls, 0);
    }
}
