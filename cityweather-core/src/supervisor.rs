//! Single-flight dispatch of resolutions off the presentation thread.
//!
//! At most one resolution runs at a time. A request that arrives while
//! another is in flight is dropped, not queued, so an older response can
//! never overwrite a newer one. Results come back through an unbounded
//! channel that the presentation layer drains on its own loop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{runtime::Handle, sync::mpsc};

use crate::{
    model::{FailureReason, FetchStage, ResolutionResult, ResolveOptions},
    resolver::WeatherResolver,
};

/// A finished resolution, delivered on the completion channel.
#[derive(Debug, Clone)]
pub struct Completion {
    pub city: String,
    pub result: ResolutionResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Another resolution was still in flight.
    Dropped,
}

pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

#[derive(Debug)]
pub struct ResolveSupervisor {
    resolver: Arc<WeatherResolver>,
    runtime: Handle,
    busy: Arc<AtomicBool>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl ResolveSupervisor {
    /// `runtime` is where resolutions run; `submit` itself may be called from any thread.
    pub fn new(resolver: WeatherResolver, runtime: Handle) -> (Self, CompletionReceiver) {
        let (completions, receiver) = mpsc::unbounded_channel();

        let supervisor = Self {
            resolver: Arc::new(resolver),
            runtime,
            busy: Arc::new(AtomicBool::new(false)),
            completions,
        };

        (supervisor, receiver)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start resolving `city` unless a resolution is already running.
    /// `options` overrides the resolver's units and language for this call only.
    pub fn submit(&self, city: impl Into<String>, options: Option<ResolveOptions>) -> Submission {
        let city = city.into();

        let Some(guard) = BusyGuard::acquire(&self.busy) else {
            tracing::info!(city = %city, "resolution already in flight, dropping request");
            return Submission::Dropped;
        };

        let resolver = Arc::clone(&self.resolver);
        let completions = self.completions.clone();
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            let lookup_city = city.clone();
            let lookup = runtime.spawn(async move {
                match &options {
                    Some(options) => resolver.resolve_with(&lookup_city, options).await,
                    None => resolver.resolve(&lookup_city).await,
                }
            });

            // A panicking lookup still produces a completion, so the consumer never waits forever.
            let result = lookup.await.unwrap_or_else(|error| {
                tracing::error!(city = %city, %error, "resolution task failed");
                ResolutionResult::Failure(FailureReason::FetchFailed { stage: FetchStage::Weather })
            });

            // Free the slot first so whoever consumes the completion can submit again.
            drop(guard);

            if completions.send(Completion { city, result }).is_err() {
                tracing::debug!("completion receiver is gone, discarding result");
            }
        });

        Submission::Accepted
    }
}

/// Holds the busy flag; clears it on drop, including when the task panics.
#[derive(Debug)]
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fetcher::{Fetcher, Transport, TransportError},
        model::Units,
        resolver::Endpoints,
    };
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Answers geocoding with an empty list once a permit is released.
    #[derive(Debug)]
    struct GatedTransport {
        gate: Semaphore,
        calls: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl GatedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self { gate: Semaphore::new(0), calls: Mutex::new(Vec::new()) })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn get_json(
            &self,
            _url: &str,
            query: &[(String, String)],
        ) -> Result<Value, TransportError> {
            self.calls.lock().unwrap().push(query.to_vec());
            self.gate.acquire().await.unwrap().forget();
            Ok(json!([]))
        }
    }

    fn supervisor(transport: Arc<GatedTransport>) -> (ResolveSupervisor, CompletionReceiver) {
        let resolver = WeatherResolver::new(
            Fetcher::with_transport(transport, "KEY"),
            Endpoints { geocoding: "http://geo.test".into(), weather: "http://weather.test".into() },
            ResolveOptions::default(),
        );
        ResolveSupervisor::new(resolver, Handle::current())
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_dropped() {
        let transport = GatedTransport::new();
        let (supervisor, mut completions) = supervisor(transport.clone());

        assert_eq!(supervisor.submit("Ankara", None), Submission::Accepted);
        tokio::task::yield_now().await;
        assert!(supervisor.is_busy());

        assert_eq!(supervisor.submit("Izmir", None), Submission::Dropped);

        transport.gate.add_permits(1);
        let completion = completions.recv().await.unwrap();

        assert_eq!(completion.city, "Ankara");
        assert_eq!(completion.result.failure(), Some(FailureReason::CityNotFound));
        assert_eq!(transport.call_count(), 1);
        assert!(!supervisor.is_busy());
    }

    #[tokio::test]
    async fn slot_is_free_again_after_completion() {
        let transport = GatedTransport::new();
        let (supervisor, mut completions) = supervisor(transport.clone());
        transport.gate.add_permits(2);

        assert_eq!(supervisor.submit("Ankara", None), Submission::Accepted);
        completions.recv().await.unwrap();

        let options = ResolveOptions { units: Units::Imperial, lang: "tr".into() };
        assert_eq!(supervisor.submit("Istanbul", Some(options)), Submission::Accepted);
        let completion = completions.recv().await.unwrap();

        assert_eq!(completion.city, "Istanbul");
        assert_eq!(transport.call_count(), 2);
    }

    #[derive(Debug)]
    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        async fn get_json(
            &self,
            _url: &str,
            _query: &[(String, String)],
        ) -> Result<Value, TransportError> {
            panic!("transport blew up");
        }
    }

    #[tokio::test]
    async fn panicking_lookup_still_completes_and_frees_slot() {
        let resolver = WeatherResolver::new(
            Fetcher::with_transport(Arc::new(PanickingTransport), "KEY"),
            Endpoints { geocoding: "http://geo.test".into(), weather: "http://weather.test".into() },
            ResolveOptions::default(),
        );
        let (supervisor, mut completions) = ResolveSupervisor::new(resolver, Handle::current());

        assert_eq!(supervisor.submit("Ankara", None), Submission::Accepted);
        let completion = completions.recv().await.unwrap();

        assert_eq!(completion.city, "Ankara");
        assert_eq!(
            completion.result.failure(),
            Some(FailureReason::FetchFailed { stage: FetchStage::Weather })
        );
        assert!(!supervisor.is_busy());
    }

    #[tokio::test]
    async fn dropped_receiver_makes_completion_a_no_op() {
        let transport = GatedTransport::new();
        let (supervisor, completions) = supervisor(transport.clone());
        drop(completions);
        transport.gate.add_permits(1);

        assert_eq!(supervisor.submit("Ankara", None), Submission::Accepted);
        while supervisor.is_busy() {
            tokio::task::yield_now().await;
        }

        assert_eq!(transport.call_count(), 1);
    }
}
