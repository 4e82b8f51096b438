use super::{GenerateContext, Generator, Options, options};
use crate::error::Result;
use crate::keys::KeySource;
use crate::operation::{Operation, OperationKind};
use crate::service::ServiceType;

const DEFAULT_DESTINATION: &str = "kvload";

/// Sends messages to a single destination of a messaging service.
#[derive(Debug)]
pub(super) struct SendOnly {
    destination: String,
}

impl Default for SendOnly {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.into(),
        }
    }
}

impl SendOnly {
    pub const NAME: &'static str = "send";
}

impl Generator for SendOnly {
    fn service_type(&self) -> ServiceType {
        ServiceType::Messaging
    }

    fn operation_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::Send]
    }

    fn default_keys(&self) -> Option<KeySource> {
        None
    }

    fn configure(&mut self, options: &mut Options) -> Result<()> {
        if let Some(destination) = options::take(options, Self::NAME, "destination")? {
            self.destination = destination;
        }
        Ok(())
    }

    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>> {
        if cx.shutting_down {
            return Ok(None);
        }
        Ok(Some(Operation::send(&self.destination, cx.value())))
    }
}
