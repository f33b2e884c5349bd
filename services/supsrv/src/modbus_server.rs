//! Per-entry MODBUS server
//!
//! Every accepted RTU unit entry pairs with one MODBUS server instance: a
//! register/coil space the gateway pushes device state into (writes) and
//! reads supervisor commands out of (reads). The supervisor side reads the
//! same space through typed accessors.
//!
//! Space layout: holding registers 0..31 carry device state (gateway
//! written), 32..63 carry supervisor commands (gateway read). Input
//! registers and discrete inputs alias the holding/coil spaces so all
//! eight function codes service uniformly.

use fission_comlink::modbus::{
    ExceptionCode, FunctionCode, ModbusReply, ModbusRequest, ReplyBody, RequestBody,
};
use tracing::trace;

/// Register/coil space layout shared with the RTU gateways.
pub mod layout {
    /// Device state registers written by the gateway
    pub const STATE_BASE: u16 = 0;
    /// Supervisor command registers read by the gateway
    pub const CMD_BASE: u16 = 32;
    pub const REG_COUNT: u16 = 64;
    pub const COIL_COUNT: u16 = 32;

    /// Multiblock formed flag
    pub const COIL_FORMED: u16 = 0;
    /// Device fault flag
    pub const COIL_FAULTED: u16 = 1;
    /// Turbine trip flag
    pub const COIL_TRIP: u16 = 2;

    // State register offsets, by device kind
    /// Induction matrix charge, fraction x 10000
    pub const IMATRIX_CHARGE: u16 = 0;
    /// Matrix input rate, u32 kFE/t x 10
    pub const IMATRIX_INFLOW: u16 = 2;
    /// Matrix output rate, u32 kFE/t x 10
    pub const IMATRIX_OUTFLOW: u16 = 4;
    /// Dynamic tank fill, fraction x 10000
    pub const TANK_FILL: u16 = 0;
    /// Environment detector level, u32 uSv/h
    pub const ENVD_RADIATION: u16 = 0;
    /// Turbine production rate, u32 kFE/t x 10
    pub const TURBINE_PROD: u16 = 2;
    /// Boiler boil rate, u32 mB/t
    pub const BOILER_BOIL_RATE: u16 = 2;
    /// SPS process rate, u32 mB/t
    pub const SPS_PROCESS_RATE: u16 = 2;
}

/// One MODBUS register/coil space with request servicing.
#[derive(Debug, Clone)]
pub struct ModbusServer {
    registers: [u16; layout::REG_COUNT as usize],
    coils: [bool; layout::COIL_COUNT as usize],
}

impl Default for ModbusServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModbusServer {
    pub fn new() -> Self {
        Self {
            registers: [0; layout::REG_COUNT as usize],
            coils: [false; layout::COIL_COUNT as usize],
        }
    }

    /// Re-bind after a remount: device state resets, supervisor command
    /// registers survive so a re-formed device resumes its commands.
    pub fn rebind(&mut self) {
        for reg in &mut self.registers[..layout::CMD_BASE as usize] {
            *reg = 0;
        }
        let formed = self.coils[layout::COIL_FORMED as usize];
        self.coils = [false; layout::COIL_COUNT as usize];
        self.coils[layout::COIL_FORMED as usize] = formed;
    }

    /// Service one request against this space.
    pub fn handle(&mut self, req: &ModbusRequest) -> ModbusReply {
        trace!("modbus server: unit {} fc {:?}", req.unit_id, req.func);
        let body = match &req.body {
            RequestBody::Read { addr, count } => self.read(req.func, *addr, *count),
            RequestBody::WriteSingleCoil { addr, value } => self.write_coil(*addr, *value),
            RequestBody::WriteSingleRegister { addr, value } => self.write_register(*addr, *value),
            RequestBody::WriteMultipleCoils { addr, values } => self.write_coils(*addr, values),
            RequestBody::WriteMultipleRegisters { addr, values } => {
                self.write_registers(*addr, values)
            }
        };
        match body {
            Ok(body) => ModbusReply {
                txn_id: req.txn_id,
                unit_id: req.unit_id,
                func: req.func,
                body,
            },
            Err(code) => ModbusReply::exception(req, code),
        }
    }

    fn read(&self, func: FunctionCode, addr: u16, count: u16) -> Result<ReplyBody, ExceptionCode> {
        match func {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                let end = addr.checked_add(count).ok_or(ExceptionCode::IllegalDataAddress)?;
                if end > layout::COIL_COUNT {
                    return Err(ExceptionCode::IllegalDataAddress);
                }
                Ok(ReplyBody::Coils(
                    self.coils[addr as usize..end as usize].to_vec(),
                ))
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                let end = addr.checked_add(count).ok_or(ExceptionCode::IllegalDataAddress)?;
                if end > layout::REG_COUNT {
                    return Err(ExceptionCode::IllegalDataAddress);
                }
                Ok(ReplyBody::Registers(
                    self.registers[addr as usize..end as usize].to_vec(),
                ))
            }
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }

    fn write_coil(&mut self, addr: u16, value: bool) -> Result<ReplyBody, ExceptionCode> {
        if addr >= layout::COIL_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        self.coils[addr as usize] = value;
        Ok(ReplyBody::WriteAck {
            addr,
            value: if value { 0xFF00 } else { 0x0000 },
        })
    }

    fn write_register(&mut self, addr: u16, value: u16) -> Result<ReplyBody, ExceptionCode> {
        if addr >= layout::REG_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        self.registers[addr as usize] = value;
        Ok(ReplyBody::WriteAck { addr, value })
    }

    fn write_coils(&mut self, addr: u16, values: &[bool]) -> Result<ReplyBody, ExceptionCode> {
        let end = addr
            .checked_add(values.len() as u16)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        if end > layout::COIL_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        for (i, v) in values.iter().enumerate() {
            self.coils[addr as usize + i] = *v;
        }
        Ok(ReplyBody::WriteMultiAck {
            addr,
            count: values.len() as u16,
        })
    }

    fn write_registers(&mut self, addr: u16, values: &[u16]) -> Result<ReplyBody, ExceptionCode> {
        let end = addr
            .checked_add(values.len() as u16)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        if end > layout::REG_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        for (i, v) in values.iter().enumerate() {
            self.registers[addr as usize + i] = *v;
        }
        Ok(ReplyBody::WriteMultiAck {
            addr,
            count: values.len() as u16,
        })
    }

    // ---- Supervisor-side typed access ----

    pub fn reg(&self, addr: u16) -> u16 {
        self.registers.get(addr as usize).copied().unwrap_or(0)
    }

    pub fn set_reg(&mut self, addr: u16, value: u16) {
        if let Some(slot) = self.registers.get_mut(addr as usize) {
            *slot = value;
        }
    }

    fn reg_u32(&self, addr: u16) -> u32 {
        (u32::from(self.reg(addr)) << 16) | u32::from(self.reg(addr + 1))
    }

    pub fn coil(&self, addr: u16) -> bool {
        self.coils.get(addr as usize).copied().unwrap_or(false)
    }

    pub fn formed(&self) -> bool {
        self.coil(layout::COIL_FORMED)
    }

    pub fn faulted(&self) -> bool {
        self.coil(layout::COIL_FAULTED)
    }

    pub fn turbine_trip(&self) -> bool {
        self.coil(layout::COIL_TRIP)
    }

    /// Induction matrix charge as a fraction 0..1.
    pub fn charge_fraction(&self) -> f64 {
        f64::from(self.reg(layout::IMATRIX_CHARGE)) / 10_000.0
    }

    /// Dynamic tank fill as a fraction 0..1.
    pub fn fill_fraction(&self) -> f64 {
        f64::from(self.reg(layout::TANK_FILL)) / 10_000.0
    }

    /// Matrix input rate, kFE/t.
    pub fn inflow_kfe(&self) -> f64 {
        f64::from(self.reg_u32(layout::IMATRIX_INFLOW)) / 10.0
    }

    /// Matrix output rate, kFE/t.
    pub fn outflow_kfe(&self) -> f64 {
        f64::from(self.reg_u32(layout::IMATRIX_OUTFLOW)) / 10.0
    }

    /// Environment detector level, mSv/h.
    pub fn radiation_msv_h(&self) -> f64 {
        f64::from(self.reg_u32(layout::ENVD_RADIATION)) / 1_000.0
    }
}
