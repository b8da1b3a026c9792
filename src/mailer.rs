use std::sync::Arc;
use std::time::Duration;

use common::Error;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;

use crate::Config;

mod templates;

pub use templates::{CancellationTerms, ReservationMail};

/// A basic interface to send email messages
#[derive(Clone, Debug)]
pub struct Mailer {
	from:       Address,
	operator:   Option<Address>,
	send_queue: mpsc::Sender<Message>,
}

/// A fake mailbox to keep track of mails sent in tests
#[derive(Default)]
pub struct StubMailbox {
	pub mailbox: Mutex<Vec<Message>>,
	pub signal:  Condvar,
}

impl Mailer {
	/// Create a new mailer
	///
	/// # Panics
	/// Panics if a stub mailer is expected but not provided
	#[must_use]
	pub fn new(config: &Config, stub_mailer: Option<Arc<StubMailbox>>) -> Self {
		let (tx, rx) = mpsc::channel(config.email_queue_size);

		if config.email_smtp_server == "stub" {
			let stub_mailer = stub_mailer.expect("MISSING STUB MAILER");

			tokio::spawn(Self::start_stub_sender(rx, stub_mailer));
		} else {
			tokio::spawn(Self::start_smtp_sender(
				rx,
				config.email_address.clone(),
				config.email_smtp_server.clone(),
				config.email_smtp_password.clone(),
			));
		}

		Self {
			from:       config.email_address.clone(),
			operator:   config.operator_email.clone(),
			send_queue: tx,
		}
	}

	/// Address that receives a copy of every new reservation, if any
	#[must_use]
	pub fn operator(&self) -> Option<&Address> { self.operator.as_ref() }

	/// Try to build an email [`Message`]
	///
	/// # Errors
	/// Fails if the receiver or body cannot be parsed
	pub fn try_build_message(
		&self,
		receiver: impl TryInto<Mailbox, Error = impl Into<Error>>,
		subject: &str,
		body: &str,
	) -> Result<Message, Error> {
		Ok(Message::builder()
			.from(Mailbox::new(None, self.from.clone()))
			.to(receiver.try_into().map_err(Into::into)?)
			.subject(subject)
			.body(body.to_string())?)
	}

	/// Send a message and wait if the mail queue is full
	///
	/// # Errors
	/// Fails if the other end of the mail queue was unexpectedly closed
	pub async fn send(&self, message: Message) -> Result<(), Error> {
		Ok(self.send_queue.send(message).await?)
	}

	/// Start an infinitely looping stub sender task
	#[instrument(skip_all)]
	async fn start_stub_sender(
		mut rx: mpsc::Receiver<Message>,
		stub_mailer: Arc<StubMailbox>,
	) {
		while let Some(mail) = rx.recv().await {
			let mail_pretty =
				String::from_utf8_lossy(&mail.formatted()).to_string();

			{
				let mut mailbox = stub_mailer.mailbox.lock();
				mailbox.push(mail);
				stub_mailer.signal.notify_all();
			}

			info!(
				target: "[STUB_MAILER]",
				"sent email:\n{}\n",
				mail_pretty
			);
		}
	}

	/// Start an infinitely looping smtp sender task
	///
	/// Queued mails are dropped with an error log if the relay cannot be
	/// configured
	#[instrument(skip_all)]
	async fn start_smtp_sender(
		mut rx: mpsc::Receiver<Message>,
		address: Address,
		server: String,
		password: String,
	) {
		let transport = match SmtpTransport::starttls_relay(&server) {
			Ok(relay) => {
				relay
					.credentials(Credentials::new(address.to_string(), password))
					.build()
			},
			Err(e) => {
				error!("invalid smtp relay {server} -- {e:?}");

				while let Some(mail) = rx.recv().await {
					warn!("dropping email to {:?}", mail.envelope().to());
				}

				return;
			},
		};

		if let Err(e) = transport.test_connection() {
			warn!("smtp connection test failed -- {e:?}");
		}

		while let Some(mail) = rx.recv().await {
			match transport.send(&mail) {
				Ok(res) => info!("sent email: {res:?}"),
				Err(e) => error!("error sending email: {e:?}"),
			}

			tokio::time::sleep(Duration::from_millis(200)).await;
		}
	}
}
