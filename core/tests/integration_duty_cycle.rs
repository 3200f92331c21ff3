//! Integration tests: scan duty cycle timing over the loopback radio, with
//! the tokio clock paused so windows elapse instantly.
//!
//! Run with:
//!   cargo test --test integration_duty_cycle

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use blelink_core::{
    CentralConfig, CentralPhase, CentralSession, DutyCycle, LoopbackAir, PeripheralConfig,
    PeripheralRadio, PeripheralSession, ServiceIdentity, SessionStatus, StatusStream,
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

async fn next(stream: &mut StatusStream) -> Result<SessionStatus> {
    timeout(Duration::from_secs(60), stream.recv())
        .await
        .map_err(|_| anyhow!("no status within 60s"))?
        .ok_or_else(|| anyhow!("status stream closed"))
}

fn identity() -> Result<ServiceIdentity> {
    Ok(ServiceIdentity::new(Uuid::new_v4(), Uuid::new_v4())?)
}

/// Central on `air` with the given windows, configured and scanning
async fn scanning_central(
    air: &LoopbackAir,
    identity: ServiceIdentity,
    duty_cycle: DutyCycle,
) -> Result<(CentralSession, StatusStream)> {
    let config = CentralConfig {
        duty_cycle,
        ..CentralConfig::default()
    };
    let (central, mut status) = CentralSession::spawn(air.central_radio(), config)?;
    central.configure(identity).await?;
    assert_eq!(next(&mut status).await?, SessionStatus::Ready);
    central.begin_scanning().await?;
    assert_eq!(next(&mut status).await?, SessionStatus::Scanning);
    Ok((central, status))
}

#[tokio::test(start_paused = true)]
async fn test_foreign_advertiser_never_interrupts_the_cycle() -> Result<()> {
    init_tracing();
    let air = LoopbackAir::new();

    // Someone else's service is on the air the whole time
    let foreign = air.peripheral_radio();
    foreign.start_advertising(&identity()?, Some("stranger")).await?;

    let duty_cycle = DutyCycle::new(3000, 3000)?;
    let (central, mut status) = scanning_central(&air, identity()?, duty_cycle).await?;

    const CYCLES: usize = 5;
    let mut window_start = Instant::now();
    for _ in 0..CYCLES {
        assert_eq!(next(&mut status).await?, SessionStatus::Waiting);
        assert_eq!(window_start.elapsed(), duty_cycle.scan_duration());
        window_start = Instant::now();

        assert_eq!(next(&mut status).await?, SessionStatus::Scanning);
        assert_eq!(window_start.elapsed(), duty_cycle.wait_delay());
        window_start = Instant::now();
    }

    let snapshot = central.snapshot().await?;
    assert_eq!(snapshot.phase, CentralPhase::Scanning);
    assert!(snapshot.candidate.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_uneven_windows() -> Result<()> {
    init_tracing();
    let air = LoopbackAir::new();
    let duty_cycle = DutyCycle::new(500, 4500)?;
    assert_eq!(duty_cycle.duty_percent(), 10);
    let (_central, mut status) = scanning_central(&air, identity()?, duty_cycle).await?;

    let started = Instant::now();
    assert_eq!(next(&mut status).await?, SessionStatus::Waiting);
    assert_eq!(started.elapsed(), Duration::from_millis(500));
    assert_eq!(next(&mut status).await?, SessionStatus::Scanning);
    assert_eq!(started.elapsed(), Duration::from_millis(5000));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_peer_appearing_mid_window_ends_the_cycle() -> Result<()> {
    init_tracing();
    let air = LoopbackAir::new();
    let wanted = identity()?;
    let duty_cycle = DutyCycle::default();
    let (central, mut status) = scanning_central(&air, wanted, duty_cycle).await?;

    // Let a couple of empty cycles pass
    for _ in 0..2 {
        assert_eq!(next(&mut status).await?, SessionStatus::Waiting);
        assert_eq!(next(&mut status).await?, SessionStatus::Scanning);
    }

    let (peripheral, mut peripheral_status) =
        PeripheralSession::spawn(air.peripheral_radio(), PeripheralConfig::default());
    peripheral.start_advertising(wanted).await?;
    assert_eq!(next(&mut peripheral_status).await?, SessionStatus::Ready);
    assert_eq!(next(&mut peripheral_status).await?, SessionStatus::Advertising);

    match next(&mut status).await? {
        SessionStatus::PeersFound(peers) => {
            assert_eq!(peers.len(), 1);
            assert!(peers[0].advertises(&wanted.service));
        }
        other => return Err(anyhow!("expected PeersFound, got {}", other)),
    }

    // No more windows once a candidate is held
    tokio::time::sleep(duty_cycle.scan_duration() * 4).await;
    assert!(status.try_recv().is_none());
    assert_eq!(central.snapshot().await?.phase, CentralPhase::PeerFound);
    Ok(())
}
