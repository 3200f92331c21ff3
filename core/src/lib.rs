// blelink core: a one-to-one BLE data link between a central and a peripheral
//
// The central scans in a duty cycle for a peripheral advertising a known
// service, connects and receives data. The peripheral advertises that
// service, accepts one central and pushes data to it. Both report every
// transition on an ordered status stream.

pub mod radio;
pub mod session;

pub use radio::loopback::{LoopbackAir, LoopbackCentral, LoopbackPeripheral};
pub use radio::{
    Availability, CentralRadio, CentralRadioEvent, PeerHandle, PeripheralRadio,
    PeripheralRadioEvent, RadioError, UnavailabilityCause,
};
pub use session::{
    CentralConfig, CentralPhase, CentralSession, CentralSnapshot, ConfigError, DiscoveredPeer,
    DutyCycle, FailureKind, PeripheralConfig, PeripheralPhase, PeripheralSession,
    PeripheralSnapshot, ServiceIdentity, SessionError, SessionStatus, StatusStream,
};
