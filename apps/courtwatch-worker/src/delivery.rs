use serde_json::Value;

use courtwatch_service::{BoxFuture, DeliverySink, DigestMessage, RealtimeNotification, Result};

const REDACTED: &str = "[REDACTED]";

/// Blanks every `secret_key` field. Those keys double as one-click unsubscribe credentials.
fn redact_secret_keys(value: &mut Value) {
	match value {
		Value::Object(map) => {
			for (key, field) in map.iter_mut() {
				if key == "secret_key" {
					*field = Value::String(REDACTED.to_string());
				} else {
					redact_secret_keys(field);
				}
			}
		},
		Value::Array(items) => items.iter_mut().for_each(redact_secret_keys),
		_ => {},
	}
}

/// Writes every outgoing message to the log as JSON, with secret keys redacted.
///
/// Stands in for the mailer and webhook senders, which consume the same payloads.
#[derive(Debug, Default)]
pub struct LogDelivery;
impl DeliverySink for LogDelivery {
	fn deliver_realtime<'a>(
		&'a self,
		notification: &'a RealtimeNotification,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut payload = serde_json::to_value(notification)?;

			redact_secret_keys(&mut payload);

			tracing::info!(
				recipient = notification.recipient,
				query_id = %notification.alert.query_id,
				payload = %payload,
				"Realtime alert ready."
			);

			Ok(())
		})
	}

	fn deliver_digest<'a>(&'a self, message: &'a DigestMessage) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut payload = serde_json::to_value(message)?;

			redact_secret_keys(&mut payload);

			tracing::info!(
				recipient = message.recipient,
				rate = %message.rate,
				total_hits = message.total_hits,
				payload = %payload,
				"Digest ready."
			);

			Ok(())
		})
	}
}
