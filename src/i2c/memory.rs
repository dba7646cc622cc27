//! Remote memory units.
//!
//! Most digital LEGO sensors present themselves as a small register file
//! behind the SMBus register-read protocol. This layer wraps the global
//! engine with blocking helpers so sensor drivers read and write those
//! registers in one call; the polling happens against the sub-tick
//! interrupt, so these must not be called before the lifecycle has
//! brought the I²C engine up (nor from interrupt context).

use super::{Failure, Status};
use crate::{sensors, systick, Port};

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Error {
    /// The sensor mux refused the port (wrong mode).
    Mux(sensors::Error),
    /// The engine rejected the request.
    Bus(super::Error),
    /// The transaction ran and failed on the wire.
    Transfer(Failure),
}

/// Put `port` into digital mode and bind the memory unit's address.
pub fn init(port: Port, address: u8, lego_compat: bool) -> Result<(), Error> {
    let pins = sensors::i2c_enable(port).map_err(Error::Mux)?;
    super::attach(port, pins);
    super::register(port, address, lego_compat).map_err(Error::Bus)?;
    Ok(())
}

/// Release the port back to the idle state.
pub fn close(port: Port) {
    super::detach(port);
    sensors::disable(port);
}

/// Read `buf.len()` bytes starting at `internal_address`. Blocks until
/// the transfer completes.
pub fn read(port: Port, internal_address: u8, buf: &mut [u8]) -> Result<(), Error> {
    nb::block!(super::start_read(port, Some(internal_address), buf.len())).map_err(Error::Bus)?;
    finish(port)?;
    super::read_result(port, buf).map_err(Error::Bus)?;
    Ok(())
}

/// Write `data` starting at `internal_address`. Blocks until the
/// transfer completes.
pub fn write(port: Port, internal_address: u8, data: &[u8]) -> Result<(), Error> {
    nb::block!(super::start_write(port, Some(internal_address), data)).map_err(Error::Bus)?;
    finish(port)
}

fn finish(port: Port) -> Result<(), Error> {
    while super::busy(port) {
        systick::wait_ms(1);
    }
    match super::status(port) {
        Status::Success => Ok(()),
        Status::Failed(failure) => Err(Error::Transfer(failure)),
        // Only reachable if the port was torn down under our feet.
        Status::Idle | Status::InProgress => Err(Error::Transfer(Failure::Aborted)),
    }
}
