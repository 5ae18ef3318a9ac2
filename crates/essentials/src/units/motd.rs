//! Greets every session once with the message of the day.

use super::messages::MessagesConfiguration;
use essentials_core::{ConstructionError, FeatureUnit, HostContext, LogLevel, Unit, UnitError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub struct Motd {
    context: HostContext,
    messages: Arc<MessagesConfiguration>,
    greeted: Mutex<HashSet<Uuid>>,
}

impl Unit for Motd {
    const NAME: &'static str = "Motd";

    fn construct(context: HostContext) -> Result<Self, ConstructionError> {
        let messages = context.configuration::<MessagesConfiguration>()?;
        Ok(Self {
            context,
            messages,
            greeted: Mutex::new(HashSet::new()),
        })
    }
}

impl FeatureUnit for Motd {
    fn on_sync(&self) -> Result<(), UnitError> {
        let sessions = self.context.online_sessions();
        let mut greeted = self.greeted.lock();

        // Forget sessions that left so they are greeted again on return.
        greeted.retain(|id| sessions.iter().any(|s| s.id() == *id));

        for session in sessions {
            if greeted.insert(session.id()) {
                let name = session.name();
                self.messages.send_chat_message(session.as_ref(), "motd", &[name.as_str()]);
            }
        }
        Ok(())
    }

    fn on_reload(&self) -> Result<(), UnitError> {
        self.greeted.lock().clear();
        self.context.log(LogLevel::Debug, "Greeting everyone again after reload");
        Ok(())
    }
}
