//! Process-wide context: current organization, location and session
//!
//! Every screen reads the context; each of the three values has exactly one
//! writer object, handed out once by `AppContext::new`. Writers are neither
//! `Clone` nor reachable from the context itself.

use crate::dataflow::{Atom, Derived, ReadOnly, Runtime, Task, TaskHandle};
use crate::errors::ReauthenticationRequest;
use crate::storage::{KeyValueStore, load_json, save_json};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use shared::{Location, Organization, UserSession};
use std::rc::Rc;

const LOCATION_KEY: &str = "dashboard.location_id";

#[derive(Clone)]
pub struct AppContext {
    organization: ReadOnly<Option<Organization>>,
    location: ReadOnly<Option<Location>>,
    session: ReadOnly<Option<UserSession>>,
    location_in_scope: Derived<Option<Location>>,
}

/// The single writers of the context values.
pub struct ContextWriters {
    pub organization: OrganizationWriter,
    pub location: LocationWriter,
    pub session: SessionWriter,
}

impl AppContext {
    pub fn new(runtime: &Runtime) -> (Self, ContextWriters) {
        Self::build(runtime, None)
    }

    /// Like `new`, but the selected location id survives reloads in `store`.
    pub fn with_store(runtime: &Runtime, store: Rc<dyn KeyValueStore>) -> (Self, ContextWriters) {
        Self::build(runtime, Some(store))
    }

    fn build(runtime: &Runtime, store: Option<Rc<dyn KeyValueStore>>) -> (Self, ContextWriters) {
        let organization = runtime.atom(None::<Organization>);
        let location = runtime.atom(None::<Location>);
        let session = runtime.atom(None::<UserSession>);

        let location_in_scope = runtime.derive({
            let (organization, location, session) =
                (organization.clone(), location.clone(), session.clone());
            move || {
                let organization_id = organization.with(|org| org.as_ref().map(|org| org.id.clone()))?;
                let allowed = session.with(|session| {
                    session
                        .as_ref()
                        .is_some_and(|session| session.can_access(&organization_id))
                });
                if !allowed {
                    return None;
                }
                location
                    .get()
                    .filter(|location| location.organization_id == organization_id)
            }
        });

        let context = Self {
            organization: organization.read_only(),
            location: location.read_only(),
            session: session.read_only(),
            location_in_scope,
        };
        let writers = ContextWriters {
            organization: OrganizationWriter { organization },
            location: LocationWriter { location, store },
            session: SessionWriter { session },
        };
        (context, writers)
    }

    pub fn organization(&self) -> ReadOnly<Option<Organization>> {
        self.organization.clone()
    }

    pub fn location(&self) -> ReadOnly<Option<Location>> {
        self.location.clone()
    }

    pub fn session(&self) -> ReadOnly<Option<UserSession>> {
        self.session.clone()
    }

    /// The selected location, but only while it belongs to the current
    /// organization and the signed-in user may access that organization.
    pub fn location_in_scope(&self) -> Derived<Option<Location>> {
        self.location_in_scope.clone()
    }

    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.session
            .with(|session| session.as_ref().is_some_and(|session| !session.is_expired(now)))
    }
}

pub struct OrganizationWriter {
    organization: Atom<Option<Organization>>,
}

impl OrganizationWriter {
    pub fn select(&self, organization: Option<Organization>) {
        if let Some(organization) = &organization {
            log::debug!("Switching organization to {}", organization.id);
        }
        self.organization.set_neq(organization);
    }
}

pub struct LocationWriter {
    location: Atom<Option<Location>>,
    store: Option<Rc<dyn KeyValueStore>>,
}

impl LocationWriter {
    pub fn select(&self, location: Option<Location>) {
        if let Some(store) = &self.store {
            let result = match &location {
                Some(location) => save_json(store.as_ref(), LOCATION_KEY, &location.id),
                None => {
                    store.remove(LOCATION_KEY);
                    Ok(())
                }
            };
            if let Err(error) = result {
                log::warn!("Could not remember the selected location: {error}");
            }
        }
        self.location.set_neq(location);
    }

    /// Id of the location selected in an earlier session, if any.
    pub fn remembered_id(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        load_json::<String>(store.as_ref(), LOCATION_KEY).unwrap_or_else(|error| {
            log::warn!("Ignoring remembered location: {error}");
            None
        })
    }

    /// Selects the remembered location when it is among `available`,
    /// otherwise the first one.
    pub fn restore(&self, available: &[Location]) {
        let remembered = self.remembered_id();
        let choice = available
            .iter()
            .find(|location| Some(&location.id) == remembered.as_ref())
            .or_else(|| available.first())
            .cloned();
        self.select(choice);
    }
}

pub struct SessionWriter {
    session: Atom<Option<UserSession>>,
}

impl SessionWriter {
    pub fn sign_in(&self, session: UserSession) {
        log::debug!("Signed in as {}", session.user_id);
        self.session.set(Some(session));
    }

    pub fn sign_out(&self) {
        self.session.set_neq(None);
    }

    /// Signs out whenever the error handler asks for reauthentication.
    pub fn watch_reauthentication(
        &self,
        mut requests: UnboundedReceiver<ReauthenticationRequest>,
    ) -> TaskHandle {
        let session = self.session.clone();
        Task::start_droppable(async move {
            while let Some(request) = requests.next().await {
                if session.with_untracked(Option::is_some) {
                    log::warn!("Signing out after status {}", request.status);
                }
                session.set_neq(None);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorSection;
    use crate::errors::{DefaultErrorHandler, ErrorSink, TransportError};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use tokio::task::LocalSet;

    fn organization(id: &str) -> Organization {
        Organization {
            id: id.to_string(),
            name: format!("Org {id}"),
        }
    }

    fn location(id: &str, organization_id: &str) -> Location {
        Location {
            id: id.to_string(),
            organization_id: organization_id.to_string(),
            name: format!("Site {id}"),
            utc_offset_minutes: 60,
        }
    }

    fn session(organization_ids: &[&str]) -> UserSession {
        UserSession {
            user_id: "u-1".to_string(),
            email: "ops@example.com".to_string(),
            organization_ids: organization_ids.iter().map(|id| id.to_string()).collect(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_location_in_scope_follows_organization() {
        let rt = Runtime::new();
        let (context, writers) = AppContext::new(&rt);
        let in_scope = context.location_in_scope();

        writers.session.sign_in(session(&["org-1", "org-2"]));
        writers.organization.select(Some(organization("org-1")));
        writers.location.select(Some(location("loc-1", "org-1")));
        assert_eq!(in_scope.get().map(|l| l.id), Some("loc-1".to_string()));

        writers.organization.select(Some(organization("org-2")));
        assert_eq!(in_scope.get(), None);
        // The raw location is untouched; only its scoped view changed.
        assert!(context.location().get().is_some());

        writers.organization.select(Some(organization("org-1")));
        writers.session.sign_in(session(&["org-2"]));
        assert_eq!(in_scope.get(), None);
    }

    #[test]
    fn test_authentication_respects_expiry() {
        let rt = Runtime::new();
        let (context, writers) = AppContext::new(&rt);
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        assert!(!context.is_authenticated(now));
        writers.session.sign_in(session(&[]));
        assert!(context.is_authenticated(now));
        assert!(!context.is_authenticated(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap()));

        writers.session.sign_out();
        assert!(!context.is_authenticated(now));
    }

    #[test]
    fn test_location_is_remembered_across_contexts() {
        let store: Rc<dyn KeyValueStore> = Rc::new(MemoryStore::new());
        let sites = vec![location("loc-1", "org-1"), location("loc-2", "org-1")];

        {
            let rt = Runtime::new();
            let (_context, writers) = AppContext::with_store(&rt, store.clone());
            writers.location.select(Some(sites[1].clone()));
        }

        let rt = Runtime::new();
        let (context, writers) = AppContext::with_store(&rt, store.clone());
        assert_eq!(writers.location.remembered_id().as_deref(), Some("loc-2"));
        writers.location.restore(&sites);
        assert_eq!(context.location().get(), Some(sites[1].clone()));

        writers.location.select(None);
        assert_eq!(writers.location.remembered_id(), None);
        writers.location.restore(&sites);
        assert_eq!(context.location().get(), Some(sites[0].clone()));
    }

    #[tokio::test]
    async fn test_unauthorized_response_signs_out() {
        LocalSet::new()
            .run_until(async {
                let rt = Runtime::new();
                let (context, writers) = AppContext::new(&rt);
                let (handler, reauth) = DefaultErrorHandler::new(&rt, &ErrorSection::default());
                let _watcher = writers.session.watch_reauthentication(reauth);

                writers.session.sign_in(session(&["org-1"]));
                handler.report(&TransportError::new(401));
                tokio::task::yield_now().await;

                assert_eq!(context.session().get(), None);
            })
            .await;
    }
}
