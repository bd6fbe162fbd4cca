use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;

/// Periodically expire pending appointments whose confirmation window
/// closed, freeing their slots.
pub async fn run_expiry_sweep(engine: Arc<Engine>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        let now = engine.now();
        match engine.expire_stale_pending(now).await {
            Ok(0) => {}
            Ok(n) => info!("expired {n} unconfirmed appointments"),
            Err(e) => tracing::error!("expiry sweep failed: {e}"),
        }
    }
}

/// Periodically drop blocks dated before today and re-derive client
/// segments.
pub async fn run_cleanup(engine: Arc<Engine>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        let now = engine.now();
        match engine.cleanup_exceptions(now.date()).await {
            Ok(0) => {}
            Ok(n) => info!("removed {n} past schedule blocks"),
            Err(e) => tracing::error!("block cleanup failed: {e}"),
        }
        match engine.refresh_client_segments(now).await {
            Ok(0) => {}
            Ok(n) => info!("re-segmented {n} clients"),
            Err(e) => tracing::error!("client segmentation failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::engine::{BookingRequest, EngineSettings, Store};
    use crate::model::AppointmentStatus;
    use crate::notify::ChannelNotifier;
    use chrono::{NaiveDate, NaiveTime, TimeDelta};
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("chairbook_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn sweep_and_cleanup_tasks_run_on_their_interval() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let clock = Arc::new(ManualClock::new(monday.and_hms_opt(8, 0, 0).unwrap()));
        let engine = Arc::new(
            Engine::new(
                Arc::new(Store::new()),
                test_wal_path("tasks.wal"),
                Arc::new(ChannelNotifier::new()),
                clock.clone(),
                EngineSettings::default(),
            )
            .unwrap(),
        );

        let barber = engine.create_barber("Tono").await.unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let one = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        engine.add_rule(barber.id, 0, nine, one).await.unwrap();
        engine
            .create_exception(barber.id, monday, nine, NaiveTime::from_hms_opt(10, 0, 0).unwrap(), None)
            .await
            .unwrap();
        let service = engine.create_service("Corte", 30).await.unwrap();
        let receipt = engine
            .book(BookingRequest {
                barber_id: barber.id,
                service_id: service.id,
                scheduled_at: monday.and_hms_opt(11, 0, 0).unwrap(),
                client_name: "Ana".into(),
                client_email: "ana@example.com".into(),
                client_phone: None,
                notes: None,
            })
            .await
            .unwrap();

        // Next day: the booking is stale and the block is in the past.
        clock.advance(TimeDelta::days(1));
        let shutdown = CancellationToken::new();
        let sweep = tokio::spawn(run_expiry_sweep(engine.clone(), Duration::from_millis(20), shutdown.clone()));
        let cleanup = tokio::spawn(run_cleanup(engine.clone(), Duration::from_millis(20), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        sweep.await.unwrap();
        cleanup.await.unwrap();

        let appt = engine.get_appointment(receipt.appointment.id).await.unwrap();
        assert_eq!(appt.status, AppointmentStatus::Expired);
        assert!(engine.list_exceptions(barber.id, Some(monday)).await.unwrap().is_empty());
        assert_eq!(clock.today(), monday + TimeDelta::days(1));
    }
}
