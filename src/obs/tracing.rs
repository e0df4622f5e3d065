// self
use crate::{_prelude::*, obs::OperationKind};

/// Future type produced by [`OperationSpan::instrument`]; a plain passthrough when the
/// `tracing` feature is disabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
#[allow(missing_docs)]
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// Structured span wrapped around one core operation.
///
/// Spans are named `oidc_silent_core.operation` and tagged with the operation label and
/// a stage marker; with the `tracing` feature off the whole type compiles to a no-op.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Opens a span for the given operation and stage.
	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		Self {
			#[cfg(feature = "tracing")]
			span: tracing::info_span!(
				"oidc_silent_core.operation",
				operation = kind.as_str(),
				stage
			),
		}
	}

	/// Attaches the span to an async block; the span is entered on every poll, so no
	/// guard is held across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs a swallowed background-refresh failure; the error never reaches a caller.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub(crate) fn log_background_failure(err: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %err, "Background refresh failed; a later request will retry.");
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_passes_the_future_through() {
		let span = OperationSpan::new(OperationKind::RefreshTokenExchange, "exchange");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
