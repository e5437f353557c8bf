use ulid::Ulid;

use crate::model::*;

use super::{BookingError, Engine};

impl Engine {
    /// Snapshot of every court. Waits for each court's read lock in turn
    /// (one guard at a time), so a court mid-write is included once the
    /// write finishes rather than dropped from the listing.
    pub async fn list_courts(&self) -> Vec<CourtInfo> {
        let mut courts = Vec::new();
        for id in self.store.court_ids() {
            let Some(court) = self.store.get_court(&id) else {
                continue;
            };
            let guard = court.read().await;
            courts.push(CourtInfo {
                id: guard.id,
                name: guard.name.clone(),
                metadata: guard.metadata.clone(),
            });
        }
        courts.sort_by_key(|c| c.id);
        courts
    }

    pub async fn get_court_details(&self, id: Ulid) -> Result<CourtInfo, BookingError> {
        let court = self
            .store
            .get_court(&id)
            .ok_or(BookingError::CourtNotFound(id))?;
        let guard = court.read().await;
        Ok(CourtInfo {
            id: guard.id,
            name: guard.name.clone(),
            metadata: guard.metadata.clone(),
        })
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let court_id = self
            .store
            .court_for_reservation(&id)
            .ok_or(BookingError::NotFound(id))?;
        let court = self
            .store
            .get_court(&court_id)
            .ok_or(BookingError::NotFound(id))?;
        let guard = court.read().await;
        guard.find(&id).cloned().ok_or(BookingError::NotFound(id))
    }

    /// Snapshot of one owner's reservations, newest start first.
    pub async fn reservations_for_owner(&self, owner_uid: &str) -> Vec<Reservation> {
        let mut result = Vec::new();
        for court_id in self.store.court_ids() {
            let Some(court) = self.store.get_court(&court_id) else {
                continue;
            };
            let guard = court.read().await;
            result.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.owner_uid == owner_uid)
                    .cloned(),
            );
        }
        result.sort_by(|a, b| b.span.start.cmp(&a.span.start));
        result
    }

    /// Administrative snapshot of every reservation, newest start first.
    /// Authorization happens at the HTTP boundary, which verifies the bearer
    /// credential itself.
    pub async fn all_reservations(&self) -> Vec<Reservation> {
        let mut result = Vec::new();
        for court_id in self.store.court_ids() {
            let Some(court) = self.store.get_court(&court_id) else {
                continue;
            };
            let guard = court.read().await;
            result.extend(guard.reservations.iter().cloned());
        }
        result.sort_by(|a, b| b.span.start.cmp(&a.span.start));
        result
    }
}
