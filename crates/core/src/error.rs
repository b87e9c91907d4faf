use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// A persona id was requested that the store has no definition for.
#[derive(Debug, Clone)]
pub struct PersonaNotFoundError {
    pub persona_id: String,
}

impl fmt::Display for PersonaNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persona '{}' not found", self.persona_id)
    }
}

impl std::error::Error for PersonaNotFoundError {}

/// A caller asked for a wider fan-out than the core allows in one request.
#[derive(Debug, Clone)]
pub struct FanOutLimitError {
    pub requested: usize,
    pub limit: usize,
}

impl fmt::Display for FanOutLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "maximum {} symbols per scan (got {})",
            self.limit, self.requested
        )
    }
}

impl std::error::Error for FanOutLimitError {}

pub fn ensure_fan_out(requested: usize, limit: usize) -> anyhow::Result<()> {
    if requested > limit {
        return Err(FanOutLimitError { requested, limit }.into());
    }
    Ok(())
}

/// A scan request named no usable symbols.
#[derive(Debug, Clone, Copy)]
pub struct EmptyScanError;

impl fmt::Display for EmptyScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("at least one symbol required")
    }
}

impl std::error::Error for EmptyScanError {}

/// Text carried by a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

/// Awaits one fan-out unit, turning a panic inside it into an ordinary error so the
/// sibling units in the same join keep their results.
pub async fn isolate<T, F>(unit: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(unit).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(anyhow::anyhow!(
            "unit panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}
