use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedBarberState = Arc<RwLock<BarberState>>;

/// In-memory state for the whole shop. Barber-scoped data sits behind one
/// lock per barber; services and clients are shared maps.
pub struct Store {
    barbers: DashMap<Ulid, SharedBarberState>,
    services: DashMap<Ulid, Service>,
    clients: DashMap<Ulid, Client>,
    client_by_email: DashMap<String, Ulid>,
    /// Rule / exception / appointment id → owning barber.
    entity_to_barber: DashMap<Ulid, Ulid>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            barbers: DashMap::new(),
            services: DashMap::new(),
            clients: DashMap::new(),
            client_by_email: DashMap::new(),
            entity_to_barber: DashMap::new(),
        }
    }

    // ── Barbers ──────────────────────────────────────────────

    pub fn barber_count(&self) -> usize {
        self.barbers.len()
    }

    pub fn get_barber(&self, id: &Ulid) -> Option<SharedBarberState> {
        self.barbers.get(id).map(|e| e.value().clone())
    }

    pub fn barber_ids(&self) -> Vec<Ulid> {
        self.barbers.iter().map(|e| *e.key()).collect()
    }

    pub fn barbers(&self) -> Vec<SharedBarberState> {
        self.barbers.iter().map(|e| e.value().clone()).collect()
    }

    fn insert_barber(&self, barber: Barber) {
        self.barbers
            .insert(barber.id, Arc::new(RwLock::new(BarberState::new(barber))));
    }

    fn remove_barber(&self, id: &Ulid) {
        self.barbers.remove(id);
        self.entity_to_barber.retain(|_, owner| owner != id);
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn barber_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_barber.get(entity_id).map(|e| *e.value())
    }

    fn map_entity(&self, entity_id: Ulid, barber_id: Ulid) {
        self.entity_to_barber.insert(entity_id, barber_id);
    }

    fn unmap_entity(&self, entity_id: &Ulid) {
        self.entity_to_barber.remove(entity_id);
    }

    // ── Services ─────────────────────────────────────────────

    pub fn service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn services(&self) -> Vec<Service> {
        let mut all: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    // ── Clients ──────────────────────────────────────────────

    pub fn client(&self, id: &Ulid) -> Option<Client> {
        self.clients.get(id).map(|e| e.value().clone())
    }

    pub fn client_by_email(&self, email: &str) -> Option<Client> {
        let id = *self.client_by_email.get(&normalize_email(email))?;
        self.client(&id)
    }

    /// Id for this email, reserving a fresh one if none exists yet. The
    /// entry API makes concurrent reservations for one email agree.
    pub fn reserve_client_id(&self, email: &str) -> Ulid {
        *self
            .client_by_email
            .entry(normalize_email(email))
            .or_insert_with(Ulid::new)
    }

    pub fn clients(&self) -> Vec<Client> {
        self.clients.iter().map(|e| e.value().clone()).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event that is not scoped to one barber, or that creates or
    /// deletes a barber.
    pub fn apply_global(&self, event: &Event) {
        match event {
            Event::BarberCreated { barber } => self.insert_barber(barber.clone()),
            Event::BarberDeleted { id } => self.remove_barber(id),
            Event::ServiceUpserted { service } => {
                self.services.insert(service.id, service.clone());
            }
            Event::ClientUpserted { client } => {
                self.client_by_email
                    .insert(normalize_email(&client.email), client.id);
                self.clients.insert(client.id, client.clone());
            }
            _ => {}
        }
    }

    /// Apply a barber-scoped event. The caller holds the barber's write lock.
    pub fn apply_event(&self, bs: &mut BarberState, event: &Event) {
        match event {
            Event::BarberUpdated { barber } => {
                bs.barber = barber.clone();
            }
            Event::RuleAdded { rule } => {
                bs.insert_rule(rule.clone());
                self.map_entity(rule.id, rule.barber_id);
            }
            Event::RuleRemoved { id, .. } => {
                bs.remove_rule(*id);
                self.unmap_entity(id);
            }
            Event::ExceptionAdded { exception } => {
                bs.insert_exception(exception.clone());
                self.map_entity(exception.id, exception.barber_id);
            }
            Event::ExceptionRemoved { id, .. } => {
                bs.remove_exception(*id);
                self.unmap_entity(id);
            }
            Event::AppointmentBooked { appointment } => {
                self.map_entity(appointment.id, appointment.barber_id);
                bs.insert_appointment(appointment.clone());
            }
            Event::AppointmentStatusChanged { id, status, at, .. } => {
                bs.set_status(*id, *status, *at);
            }
            Event::BarberCreated { .. }
            | Event::BarberDeleted { .. }
            | Event::ServiceUpserted { .. }
            | Event::ClientUpserted { .. } => {}
        }
    }

    /// Replay path: the store is not shared yet, so locks are uncontended.
    pub(super) fn replay_event(&self, event: &Event) {
        match event.barber_id() {
            None => self.apply_global(event),
            Some(barber_id) => {
                let Some(bs) = self.get_barber(&barber_id) else {
                    tracing::warn!("replay: event for unknown barber {barber_id}, skipped");
                    return;
                };
                match bs.try_write() {
                    Ok(mut guard) => self.apply_event(&mut guard, event),
                    Err(_) => tracing::error!("replay: barber {barber_id} unexpectedly locked"),
                };
            }
        }
    }

    /// Minimal event list that recreates the current state. Only valid while
    /// nothing else holds a barber lock; `None` if one is held.
    pub(super) fn snapshot(&self) -> Option<Vec<Event>> {
        let mut events: Vec<Event> = Vec::new();
        for service in self.services() {
            events.push(Event::ServiceUpserted { service });
        }
        for client in self.clients() {
            events.push(Event::ClientUpserted { client });
        }
        for bs in self.barbers() {
            let guard = bs.try_read().ok()?;
            events.push(Event::BarberCreated {
                barber: guard.barber.clone(),
            });
            events.extend(guard.rules.iter().map(|rule| Event::RuleAdded { rule: rule.clone() }));
            events.extend(guard.exceptions.iter().map(|exception| Event::ExceptionAdded {
                exception: exception.clone(),
            }));
            events.extend(guard.appointments.iter().map(|appointment| {
                Event::AppointmentBooked {
                    appointment: appointment.clone(),
                }
            }));
        }
        Some(events)
    }
}
