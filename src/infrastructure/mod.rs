pub mod finnhub_client;
pub mod tracing_notifier;
