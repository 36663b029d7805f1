// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::io::Error;

use sd_notify::{NotifyState, notify};
use tokio::{
    select,
    signal::unix::{Signal, SignalKind, signal},
    sync::watch,
};

#[derive(Debug)]
pub(crate) struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl ShutdownSignals {
    pub(crate) fn new() -> Result<Self, Error> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    pub(crate) async fn shutdown(&mut self) -> Option<()> {
        select! {
            result = self.interrupt.recv() => result,
            result = self.terminate.recv() => result,
            result = self.quit.recv() => result,
        }
    }

    /// Flips the returned flag to `true` once a shutdown signal arrives.
    pub(crate) fn watch(mut self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if self.shutdown().await.is_some() {
                log::info!("received shutdown signal, finishing the current batch");
                _ = Notifications::stopping();
                _ = tx.send(true);
            }
        });
        rx
    }
}

#[derive(Debug)]
pub(crate) struct Notifications {}

impl Notifications {
    pub(crate) fn starting() -> Result<(), Error> {
        notify(false, &[NotifyState::Status("starting up")])
    }

    pub(crate) fn ready(tables: usize) -> Result<(), Error> {
        notify(
            false,
            &[
                NotifyState::Ready,
                NotifyState::Status(&format!("backfilling {tables} tables")),
            ],
        )
    }

    pub(crate) fn status(message: &str) -> Result<(), Error> {
        notify(false, &[NotifyState::Status(message)])
    }

    pub(crate) fn stopping() -> Result<(), Error> {
        notify(
            false,
            &[NotifyState::Stopping, NotifyState::Status("shutting down")],
        )
    }

    pub(crate) fn failed(code: u32, message: &str) -> Result<(), Error> {
        notify(
            false,
            &[NotifyState::Status(message), NotifyState::Errno(code)],
        )
    }
}
