//! Priority-ordered dispatch

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::context::ContextStore;

use super::{Dispatch, Handler, HandlerInfo};

/// A handler and the priority it runs at
pub struct Registration {
    /// The handler
    pub handler: Box<dyn Handler>,

    /// Effective priority; higher runs first
    pub priority: i32,
}

impl Registration {
    #[must_use]
    pub fn new(handler: Box<dyn Handler>, priority: i32) -> Self {
        Self { handler, priority }
    }
}

/// Ordered handler list
///
/// Order is fixed at construction: descending priority, and among equal
/// priorities the earlier registration first.
pub struct HandlerChain {
    handlers: Vec<Registration>,
}

impl HandlerChain {
    /// Order the registrations into a chain
    #[must_use]
    pub fn new(registrations: Vec<Registration>) -> Self {
        let count = registrations.len();
        let mut ranked: Vec<(usize, Registration)> = registrations
            .into_iter()
            .enumerate()
            .map(|(position, r)| (count - position, r))
            .collect();

        ranked.sort_by(|(rank_a, a), (rank_b, b)| {
            b.priority.cmp(&a.priority).then(rank_b.cmp(rank_a))
        });

        let handlers: Vec<Registration> = ranked.into_iter().map(|(_, r)| r).collect();

        tracing::info!(
            order = ?handlers
                .iter()
                .map(|r| format!("{}({})", r.handler.name(), r.priority))
                .collect::<Vec<_>>(),
            "handler chain ready"
        );

        Self { handlers }
    }

    /// Number of handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler descriptors in chain order
    #[must_use]
    pub fn handlers(&self) -> Vec<HandlerInfo> {
        self.handlers
            .iter()
            .map(|r| HandlerInfo {
                name: r.handler.name().to_string(),
                description: r.handler.description().to_string(),
                priority: r.priority,
            })
            .collect()
    }

    /// Give `input` to each handler in turn until one answers
    ///
    /// Faults in a handler, whether errors or panics, are logged and the
    /// chain moves on.
    pub async fn dispatch(&self, input: &str, context: &mut ContextStore) -> Dispatch {
        for registration in &self.handlers {
            let handler = registration.handler.as_ref();
            let name = handler.name();

            let accepted =
                std::panic::catch_unwind(AssertUnwindSafe(|| handler.accepts(input, context)));
            match accepted {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(handler = %name, error = %e, "accepts failed, skipping");
                    continue;
                }
                Err(_) => {
                    tracing::error!(handler = %name, "accepts panicked, skipping");
                    continue;
                }
            }

            tracing::debug!(handler = %name, "handler accepted input");

            let responded = AssertUnwindSafe(handler.respond(input, context))
                .catch_unwind()
                .await;
            match responded {
                Ok(Ok(Some(response))) if !response.trim().is_empty() => {
                    tracing::info!(handler = %name, "handler responded");
                    return Dispatch::Handled {
                        handler: name.to_string(),
                        response,
                    };
                }
                Ok(Ok(_)) => {
                    tracing::debug!(handler = %name, "handler accepted but gave no response");
                }
                Ok(Err(e)) => {
                    tracing::warn!(handler = %name, error = %e, "respond failed");
                }
                Err(_) => {
                    tracing::error!(handler = %name, "respond panicked");
                }
            }
        }

        tracing::debug!("no handler produced a response");
        Dispatch::Unhandled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{Error, Result};

    #[derive(Clone, Copy)]
    enum Behavior {
        Answer(&'static str),
        Decline,
        Empty,
        AcceptError,
        RespondError,
        Panic,
    }

    struct Stub {
        name: &'static str,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn accepts(&self, _input: &str, _context: &ContextStore) -> Result<bool> {
            match self.behavior {
                Behavior::Decline => Ok(false),
                Behavior::AcceptError => Err(Error::Handler("bad accept".to_string())),
                _ => Ok(true),
            }
        }

        async fn respond(&self, _input: &str, _context: &mut ContextStore) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Answer(text) => Ok(Some(text.to_string())),
                Behavior::Empty => Ok(Some("   ".to_string())),
                Behavior::RespondError => Err(Error::Handler("bad respond".to_string())),
                Behavior::Panic => panic!("handler blew up"),
                _ => Ok(None),
            }
        }
    }

    fn stub(name: &'static str, behavior: Behavior, priority: i32) -> (Registration, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Stub {
            name,
            behavior,
            calls: Arc::clone(&calls),
        };
        (Registration::new(Box::new(handler), priority), calls)
    }

    fn context() -> ContextStore {
        ContextStore::with_limits(Duration::from_secs(120), 10)
    }

    #[test]
    fn test_order_priority_then_registration() {
        let chain = HandlerChain::new(vec![
            stub("a", Behavior::Decline, 0).0,
            stub("b", Behavior::Decline, 5).0,
            stub("c", Behavior::Decline, 0).0,
            stub("d", Behavior::Decline, 5).0,
        ]);

        let names: Vec<String> = chain.handlers().into_iter().map(|h| h.name).collect();
        assert_eq!(names, ["b", "d", "a", "c"]);
        // Stable across calls
        let again: Vec<String> = chain.handlers().into_iter().map(|h| h.name).collect();
        assert_eq!(names, again);
    }

    #[tokio::test]
    async fn test_first_answer_short_circuits() {
        let (first, first_calls) = stub("first", Behavior::Answer("one"), 1);
        let (second, second_calls) = stub("second", Behavior::Answer("two"), 0);
        let chain = HandlerChain::new(vec![second, first]);

        let result = chain.dispatch("hello", &mut context()).await;
        assert_eq!(
            result,
            Dispatch::Handled {
                handler: "first".to_string(),
                response: "one".to_string()
            }
        );
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_faults_are_isolated() {
        let chain = HandlerChain::new(vec![
            stub("accept_err", Behavior::AcceptError, 4).0,
            stub("respond_err", Behavior::RespondError, 3).0,
            stub("panics", Behavior::Panic, 2).0,
            stub("blank", Behavior::Empty, 1).0,
            stub("fallback", Behavior::Answer("ok"), 0).0,
        ]);

        let result = chain.dispatch("anything", &mut context()).await;
        assert_eq!(result.response(), Some("ok"));
    }

    #[tokio::test]
    async fn test_unhandled() {
        let (declines, declines_calls) = stub("declines", Behavior::Decline, 0);
        let chain = HandlerChain::new(vec![declines, stub("silent", Behavior::Empty, 0).0]);

        let result = chain.dispatch("anything", &mut context()).await;
        assert_eq!(result, Dispatch::Unhandled);
        assert_eq!(declines_calls.load(Ordering::SeqCst), 0);
    }
}
