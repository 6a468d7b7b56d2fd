use std::{future, pin::Pin, time::Duration};
use tokio::time::{sleep, Instant, Sleep};

/// Temporizador de inactividad de un guild.
///
/// Vive dentro de la tarea del driver, así que desaparece con ella: nunca
/// puede disparar contra un reproductor que ya no existe. Como mucho hay un
/// deadline activo a la vez.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arma el temporizador si no está armado. Devuelve `true` si se creó un
    /// deadline nuevo.
    pub fn arm(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Box::pin(sleep(self.timeout)));
        true
    }

    /// Cancela el deadline pendiente. Seguro de llamar aunque ya haya
    /// disparado o nunca se haya armado.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Reinicia la cuenta atrás.
    pub fn rearm(&mut self) {
        self.cancel();
        self.arm();
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .as_ref()
            .map(|sleep| sleep.deadline().saturating_duration_since(Instant::now()))
    }

    /// Se completa una vez cuando vence el periodo armado y deja el
    /// temporizador desarmado. Sin deadline queda pendiente para siempre.
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => future::pending().await,
        }
    }
}
