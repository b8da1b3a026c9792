use std::sync::Arc;
use std::time::{Duration, Instant};

use salon_booking::mailer::StubMailbox;

/// Run `f` and assert that it leads to exactly `count` new mails
///
/// Mails are queued by detached tasks, so this waits up to two seconds for
/// them to arrive and a little longer to catch any extra ones
#[allow(dead_code)]
pub async fn expect_mails<F, R, T>(
	stub_mailer: Arc<StubMailbox>,
	count: usize,
	f: F,
) -> T
where
	F: FnOnce() -> R,
	R: Future<Output = T>,
{
	let outbox_size = { stub_mailer.mailbox.lock().len() };

	let result = f().await;

	let deadline = Instant::now() + Duration::from_secs(2);

	loop {
		let sent = { stub_mailer.mailbox.lock().len() - outbox_size };

		if sent >= count || Instant::now() >= deadline {
			break;
		}

		tokio::time::sleep(Duration::from_millis(25)).await;
	}

	tokio::time::sleep(Duration::from_millis(100)).await;

	let sent = stub_mailer.mailbox.lock().len() - outbox_size;
	assert_eq!(sent, count, "expected {count} emails to be sent");

	result
}

#[allow(dead_code)]
pub async fn expect_no_mail<F, R, T>(stub_mailer: Arc<StubMailbox>, f: F) -> T
where
	F: FnOnce() -> R,
	R: Future<Output = T>,
{
	expect_mails(stub_mailer, 0, f).await
}
