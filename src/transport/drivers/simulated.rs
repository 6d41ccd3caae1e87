// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated incubation analyzer
//!
//! An in-memory stand-in for the instrument firmware. It exposes the same
//! holding register map as the real device and reproduces a few of its side
//! effects so the engine can run on a bench without hardware:
//!
//! - **Thermal drift**: the chamber temperature moves towards the setpoint at a
//!   fixed rate; the incubation state reports `Stable` once within ±0.5 °C.
//! - **Motor commands**: homing sets the slide-home switch and clears the step
//!   counter, starting a run clears the slide-home switch and flags the motor
//!   as busy.
//! - **Fault injection**: one-shot faults (link timeout, device exception),
//!   either for the next transaction or for the next one at a given address,
//!   and refused opens.
//! - **Operation log**: every bus call is recorded for assertions.
//!
//! Clones share the same instrument, so a test can hand one clone to the
//! transport and keep another to drive the hardware side.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::debug;

use super::BusDriver;
use crate::protocol::{decode_float, encode_float, IncubState, LimitSwitch, INCUBATION_SLOTS};
use crate::transport::error::{DeviceException, TransportError, TransportResult};

/// Number of holding registers implemented by the simulated firmware
pub const REGISTER_SPACE: usize = 64;

const AMBIENT_TEMP_C: f32 = 25.0;
const DEFAULT_TARGET_TEMP_C: f32 = 37.0;
/// Band around the setpoint reported as stable
const STABLE_BAND_C: f32 = 0.5;

const REG_CURRENT_TEMP: usize = 1;
const REG_TARGET_TEMP: usize = 3;
const REG_LIMIT_SWITCH: usize = 5;
const REG_INCUB_STATE: usize = 7;
const REG_MOTOR_HOME: u16 = 20;
const REG_MOTOR_START: u16 = 21;
const REG_MOTOR_STATE: usize = 23;
const REG_MOTOR_STEPS: usize = 24;

/// One recorded bus call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Open,
    Close,
    Read { address: u16, count: u16 },
    Write { address: u16, values: Vec<u16> },
}

/// One-shot fault returned by the next read or write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No response within the response timeout
    Timeout,
    /// Modbus exception response
    Exception(DeviceException),
}

#[derive(Debug)]
struct ThermalDrift {
    rate_c_per_s: f32,
    last_update: Instant,
}

#[derive(Debug)]
struct InstrumentState {
    registers: [u16; REGISTER_SPACE],
    open: bool,
    refuse_open: bool,
    faults: VecDeque<Fault>,
    faults_at: Vec<(u16, Fault)>,
    drift: Option<ThermalDrift>,
    operations: Vec<BusOp>,
}

impl InstrumentState {
    fn float(&self, address: usize) -> f32 {
        decode_float(&self.registers[address..address + 2])
    }

    fn set_float(&mut self, address: usize, value: f32) {
        let [low, high] = encode_float(value);
        self.registers[address] = low;
        self.registers[address + 1] = high;
    }

    fn advance_thermal_model(&mut self) {
        let Some(drift) = self.drift.as_mut() else {
            return;
        };
        let now = Instant::now();
        let dt = now.duration_since(drift.last_update).as_secs_f32();
        drift.last_update = now;
        let max_step = drift.rate_c_per_s * dt;

        let current = self.float(REG_CURRENT_TEMP);
        let target = self.float(REG_TARGET_TEMP);
        let delta = (target - current).clamp(-max_step, max_step);
        let current = current + delta;
        self.set_float(REG_CURRENT_TEMP, current);

        let state = if (target - current).abs() <= STABLE_BAND_C {
            IncubState::Stable
        } else {
            IncubState::Heating
        };
        self.registers[REG_INCUB_STATE] = state.into();
    }

    fn check_range(address: u16, count: usize) -> TransportResult<()> {
        if count == 0 || usize::from(address) + count > REGISTER_SPACE {
            return Err(DeviceException::IllegalDataAddress.into());
        }
        Ok(())
    }

    fn take_fault(&mut self, address: u16) -> TransportResult<()> {
        let targeted = self
            .faults_at
            .iter()
            .position(|(at, _)| *at == address)
            .map(|index| self.faults_at.remove(index).1);
        match targeted.or_else(|| self.faults.pop_front()) {
            None => Ok(()),
            Some(Fault::Timeout) => Err(TransportError::timeout("simulated response timeout")),
            Some(Fault::Exception(e)) => Err(TransportError::Exception(e)),
        }
    }

    fn apply_side_effects(&mut self, address: u16) {
        let switches = LimitSwitch(self.registers[REG_LIMIT_SWITCH]);
        match address {
            REG_MOTOR_HOME => {
                let homed = (switches.raw() | LimitSwitch::SLIDE_HOME) & !LimitSwitch::SLIDE_LIMIT;
                self.registers[REG_LIMIT_SWITCH] = homed;
                self.registers[REG_MOTOR_STEPS] = 0;
                self.registers[REG_MOTOR_STATE] = 0;
            }
            REG_MOTOR_START => {
                self.registers[REG_LIMIT_SWITCH] = switches.raw() & !LimitSwitch::SLIDE_HOME;
                self.registers[REG_MOTOR_STATE] = 1;
            }
            _ => {}
        }
    }
}

/// In-memory instrument implementing [`BusDriver`]
#[derive(Debug, Clone)]
pub struct SimulatedInstrument {
    state: Arc<Mutex<InstrumentState>>,
}

impl Default for SimulatedInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedInstrument {
    /// Instrument at ambient temperature, slide homed, all slots empty
    pub fn new() -> Self {
        let mut state = InstrumentState {
            registers: [0; REGISTER_SPACE],
            open: false,
            refuse_open: false,
            faults: VecDeque::new(),
            faults_at: Vec::new(),
            drift: None,
            operations: Vec::new(),
        };
        state.set_float(REG_CURRENT_TEMP, AMBIENT_TEMP_C);
        state.set_float(REG_TARGET_TEMP, DEFAULT_TARGET_TEMP_C);
        state.registers[REG_LIMIT_SWITCH] = LimitSwitch::SLIDE_HOME;
        state.registers[REG_INCUB_STATE] = IncubState::Heating.into();
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Enable thermal drift towards the setpoint at `rate_c_per_s` degrees per second
    pub fn with_thermal_drift(self, rate_c_per_s: f32) -> Self {
        self.lock().drift = Some(ThermalDrift {
            rate_c_per_s,
            last_update: Instant::now(),
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, InstrumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raw register value, zero outside the register space
    pub fn register(&self, address: u16) -> u16 {
        self.lock()
            .registers
            .get(usize::from(address))
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite a register from the hardware side. Out of range addresses are ignored.
    pub fn set_register(&self, address: u16, value: u16) {
        if let Some(reg) = self.lock().registers.get_mut(usize::from(address)) {
            *reg = value;
        }
    }

    pub fn current_temperature(&self) -> f32 {
        self.lock().float(REG_CURRENT_TEMP)
    }

    pub fn set_current_temperature(&self, value: f32) {
        self.lock().set_float(REG_CURRENT_TEMP, value);
    }

    pub fn target_temperature(&self) -> f32 {
        self.lock().float(REG_TARGET_TEMP)
    }

    /// Insert or remove a sample in a zero-based incubation slot
    pub fn set_slot_occupied(&self, slot: usize, occupied: bool) {
        if slot >= INCUBATION_SLOTS {
            return;
        }
        let mut state = self.lock();
        let switches = LimitSwitch(state.registers[REG_LIMIT_SWITCH]);
        state.registers[REG_LIMIT_SWITCH] = switches.with_slot(slot, occupied).raw();
    }

    /// Queue a fault returned by the next read or write
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Fail the next transaction that starts at `address`
    pub fn inject_fault_at(&self, address: u16, fault: Fault) {
        self.lock().faults_at.push((address, fault));
    }

    /// Make subsequent `open` calls fail
    pub fn refuse_opens(&self, refuse: bool) {
        self.lock().refuse_open = refuse;
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Snapshot of the operation log
    pub fn operations(&self) -> Vec<BusOp> {
        self.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }
}

impl BusDriver for SimulatedInstrument {
    fn open(&mut self) -> TransportResult<()> {
        let mut state = self.lock();
        state.operations.push(BusOp::Open);
        if state.refuse_open {
            state.open = false;
            return Err(TransportError::Link(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "simulated port unavailable",
            )));
        }
        state.open = true;
        debug!("Simulated instrument opened");
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.operations.push(BusOp::Close);
        state.open = false;
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> TransportResult<Vec<u16>> {
        let mut state = self.lock();
        state.operations.push(BusOp::Read { address, count });
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        state.take_fault(address)?;
        InstrumentState::check_range(address, usize::from(count))?;

        state.advance_thermal_model();
        let start = usize::from(address);
        Ok(state.registers[start..start + usize::from(count)].to_vec())
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> TransportResult<()> {
        let mut state = self.lock();
        state.operations.push(BusOp::Write {
            address,
            values: values.to_vec(),
        });
        if !state.open {
            return Err(TransportError::NotConnected);
        }
        state.take_fault(address)?;
        InstrumentState::check_range(address, values.len())?;

        // Settle the model on the old setpoint before it changes
        state.advance_thermal_model();
        let start = usize::from(address);
        state.registers[start..start + values.len()].copy_from_slice(values);
        state.apply_side_effects(address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::thread;
    use std::time::Duration;

    fn opened() -> SimulatedInstrument {
        let mut sim = SimulatedInstrument::new();
        sim.open().unwrap();
        sim
    }

    #[test]
    fn test_initial_register_map() {
        let mut sim = opened();
        let words = sim.read_holding_registers(1, 7).unwrap();
        assert_relative_eq!(decode_float(&words[0..2]), AMBIENT_TEMP_C);
        assert_relative_eq!(decode_float(&words[2..4]), DEFAULT_TARGET_TEMP_C);
        assert_eq!(words[4], LimitSwitch::SLIDE_HOME);
        assert_eq!(words[6], 0);
    }

    #[test]
    fn test_closed_link_is_rejected() {
        let mut sim = SimulatedInstrument::new();
        assert!(matches!(
            sim.read_holding_registers(1, 2),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_out_of_range_is_exception() {
        let mut sim = opened();
        let err = sim.read_holding_registers(60, 8).unwrap_err();
        assert!(!err.is_link_failure());
    }

    #[test]
    fn test_faults_are_one_shot() {
        let mut sim = opened();
        sim.inject_fault(Fault::Timeout);
        sim.inject_fault(Fault::Exception(DeviceException::ServerDeviceFailure));

        assert!(sim.read_holding_registers(5, 1).unwrap_err().is_link_failure());
        assert!(!sim.write_registers(22, &[10]).unwrap_err().is_link_failure());
        assert!(sim.read_holding_registers(5, 1).is_ok());
    }

    #[test]
    fn test_targeted_fault_waits_for_its_address() {
        let mut sim = opened();
        sim.inject_fault_at(1, Fault::Timeout);

        assert!(sim.read_holding_registers(3, 2).is_ok());
        assert!(sim.write_registers(22, &[10]).is_ok());
        assert!(sim.read_holding_registers(1, 2).unwrap_err().is_link_failure());
        assert!(sim.read_holding_registers(1, 2).is_ok());
    }

    #[test]
    fn test_motor_side_effects() {
        let mut sim = opened();
        sim.set_register(REG_MOTOR_STEPS as u16, 400);

        sim.write_registers(REG_MOTOR_START, &[1]).unwrap();
        assert_eq!(sim.register(REG_LIMIT_SWITCH as u16) & LimitSwitch::SLIDE_HOME, 0);
        assert_eq!(sim.register(REG_MOTOR_STATE as u16), 1);

        sim.write_registers(REG_MOTOR_HOME, &[1]).unwrap();
        assert_ne!(sim.register(REG_LIMIT_SWITCH as u16) & LimitSwitch::SLIDE_HOME, 0);
        assert_eq!(sim.register(REG_MOTOR_STEPS as u16), 0);
    }

    #[test]
    fn test_thermal_drift_reaches_stable() {
        let mut sim = SimulatedInstrument::new().with_thermal_drift(1000.0);
        sim.open().unwrap();
        thread::sleep(Duration::from_millis(50));
        let words = sim.read_holding_registers(1, 7).unwrap();
        assert_relative_eq!(decode_float(&words[0..2]), DEFAULT_TARGET_TEMP_C);
        assert_eq!(IncubState::from(words[6]), IncubState::Stable);
    }

    #[test]
    fn test_slot_occupancy_and_log() {
        let mut sim = opened();
        sim.set_slot_occupied(3, true);
        let words = sim.read_holding_registers(5, 1).unwrap();
        assert!(LimitSwitch(words[0]).slot_occupied(3));

        assert_eq!(
            sim.operations(),
            vec![BusOp::Open, BusOp::Read { address: 5, count: 1 }]
        );
    }
}
