//! Planning of bulk removal of unpinned contacts

use serde::Serialize;

use crate::command::Command;
use crate::stores::PinnedContacts;
use crate::types::Contact;

/// Contacts split into the ones a purge would remove and the ones it keeps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgePlan {
    /// Keys of unpinned contacts, in contact order
    pub to_remove: Vec<String>,
    pub pinned_count: usize,
    pub total_count: usize,
}

impl PurgePlan {
    pub fn from_contacts<'a, I>(contacts: I, pinned: &dyn PinnedContacts) -> Self
    where
        I: IntoIterator<Item = &'a Contact>,
    {
        let mut plan = PurgePlan::default();
        for contact in contacts {
            plan.total_count += 1;
            if pinned.is_pinned(&contact.public_key) {
                plan.pinned_count += 1;
            } else {
                plan.to_remove.push(contact.public_key.clone());
            }
        }
        plan
    }

    pub fn unpinned_count(&self) -> usize {
        self.to_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty()
    }

    /// Command that removes every planned contact
    pub fn into_command(self) -> Command {
        Command::PurgeUnpinned {
            pubkeys: self.to_remove,
        }
    }
}
