//! MODBUS-over-datagram codec
//!
//! Wire layout inside a `ProtocolId::Modbus` frame payload:
//! transaction id (u16), unit id (u8), then a standard MODBUS PDU
//! (function code + data, big-endian registers, LSB-first coil packing).
//! Replies echo the transaction id, unit id and function code; exception
//! replies set the top bit of the function code and carry one code byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ComLinkError, Result};

/// MODBUS request header bytes: txn(2) + unit(1) + func(1)
const REQ_HEADER: usize = 4;

/// Maximum coils in one read/write
pub const MAX_COILS: u16 = 2000;

/// Maximum registers in one read/write
pub const MAX_REGISTERS: u16 = 125;

/// The eight supported function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 1,
    ReadDiscreteInputs = 2,
    ReadHoldingRegisters = 3,
    ReadInputRegisters = 4,
    WriteSingleCoil = 5,
    WriteSingleRegister = 6,
    WriteMultipleCoils = 15,
    WriteMultipleRegisters = 16,
}

impl FunctionCode {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(FunctionCode::ReadCoils),
            2 => Ok(FunctionCode::ReadDiscreteInputs),
            3 => Ok(FunctionCode::ReadHoldingRegisters),
            4 => Ok(FunctionCode::ReadInputRegisters),
            5 => Ok(FunctionCode::WriteSingleCoil),
            6 => Ok(FunctionCode::WriteSingleRegister),
            15 => Ok(FunctionCode::WriteMultipleCoils),
            16 => Ok(FunctionCode::WriteMultipleRegisters),
            other => Err(ComLinkError::modbus(format!(
                "unsupported function code {:02X}",
                other
            ))),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters
        )
    }
}

/// MODBUS exception codes returned by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 1,
    IllegalDataAddress = 2,
    IllegalDataValue = 3,
    ServerDeviceFailure = 4,
}

impl ExceptionCode {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(ExceptionCode::IllegalFunction),
            2 => Ok(ExceptionCode::IllegalDataAddress),
            3 => Ok(ExceptionCode::IllegalDataValue),
            4 => Ok(ExceptionCode::ServerDeviceFailure),
            other => Err(ComLinkError::modbus(format!(
                "unknown exception code {:02X}",
                other
            ))),
        }
    }
}

/// Typed request body, one variant per function-code family
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// FC 1-4
    Read { addr: u16, count: u16 },
    /// FC 5
    WriteSingleCoil { addr: u16, value: bool },
    /// FC 6
    WriteSingleRegister { addr: u16, value: u16 },
    /// FC 15
    WriteMultipleCoils { addr: u16, values: Vec<bool> },
    /// FC 16
    WriteMultipleRegisters { addr: u16, values: Vec<u16> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModbusRequest {
    pub txn_id: u16,
    pub unit_id: u8,
    pub func: FunctionCode,
    pub body: RequestBody,
}

/// Typed reply body
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// FC 1/2
    Coils(Vec<bool>),
    /// FC 3/4
    Registers(Vec<u16>),
    /// FC 5/6 echo
    WriteAck { addr: u16, value: u16 },
    /// FC 15/16 echo
    WriteMultiAck { addr: u16, count: u16 },
    Exception(ExceptionCode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModbusReply {
    pub txn_id: u16,
    pub unit_id: u8,
    pub func: FunctionCode,
    pub body: ReplyBody,
}

impl ModbusReply {
    pub fn exception(req: &ModbusRequest, code: ExceptionCode) -> Self {
        Self {
            txn_id: req.txn_id,
            unit_id: req.unit_id,
            func: req.func,
            body: ReplyBody::Exception(code),
        }
    }
}

// Coils pack LSB-first into bytes, trailing bits zero
fn pack_coils(values: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(8)];
    for (i, v) in values.iter().enumerate() {
        if *v {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

fn unpack_coils(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
        .collect()
}

impl ModbusRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQ_HEADER + 8);
        buf.put_u16(self.txn_id);
        buf.put_u8(self.unit_id);
        buf.put_u8(self.func as u8);

        match &self.body {
            RequestBody::Read { addr, count } => {
                buf.put_u16(*addr);
                buf.put_u16(*count);
            }
            RequestBody::WriteSingleCoil { addr, value } => {
                buf.put_u16(*addr);
                buf.put_u16(if *value { 0xFF00 } else { 0x0000 });
            }
            RequestBody::WriteSingleRegister { addr, value } => {
                buf.put_u16(*addr);
                buf.put_u16(*value);
            }
            RequestBody::WriteMultipleCoils { addr, values } => {
                let packed = pack_coils(values);
                buf.put_u16(*addr);
                buf.put_u16(values.len() as u16);
                buf.put_u8(packed.len() as u8);
                buf.put_slice(&packed);
            }
            RequestBody::WriteMultipleRegisters { addr, values } => {
                buf.put_u16(*addr);
                buf.put_u16(values.len() as u16);
                buf.put_u8((values.len() * 2) as u8);
                for v in values {
                    buf.put_u16(*v);
                }
            }
        }
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < REQ_HEADER + 4 {
            return Err(ComLinkError::modbus(format!(
                "request too short: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let txn_id = buf.get_u16();
        let unit_id = buf.get_u8();
        let func = FunctionCode::from_u8(buf.get_u8())?;
        let addr = buf.get_u16();

        let body = match func {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters => {
                let count = buf.get_u16();
                let limit = if func.is_read() && (func as u8) <= 2 {
                    MAX_COILS
                } else {
                    MAX_REGISTERS
                };
                if count == 0 || count > limit {
                    return Err(ComLinkError::modbus(format!(
                        "read count {} out of range (max {})",
                        count, limit
                    )));
                }
                RequestBody::Read { addr, count }
            }
            FunctionCode::WriteSingleCoil => {
                let raw = buf.get_u16();
                let value = match raw {
                    0xFF00 => true,
                    0x0000 => false,
                    other => {
                        return Err(ComLinkError::modbus(format!(
                            "bad coil write value {:04X}",
                            other
                        )))
                    }
                };
                RequestBody::WriteSingleCoil { addr, value }
            }
            FunctionCode::WriteSingleRegister => RequestBody::WriteSingleRegister {
                addr,
                value: buf.get_u16(),
            },
            FunctionCode::WriteMultipleCoils => {
                if buf.remaining() < 3 {
                    return Err(ComLinkError::modbus("truncated multi-coil write"));
                }
                let count = buf.get_u16() as usize;
                let byte_count = buf.get_u8() as usize;
                if count == 0 || count > MAX_COILS as usize || byte_count != count.div_ceil(8) {
                    return Err(ComLinkError::modbus(format!(
                        "coil count {} / byte count {} mismatch",
                        count, byte_count
                    )));
                }
                if buf.remaining() < byte_count {
                    return Err(ComLinkError::modbus("truncated coil data"));
                }
                RequestBody::WriteMultipleCoils {
                    addr,
                    values: unpack_coils(&buf[..byte_count], count),
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                if buf.remaining() < 3 {
                    return Err(ComLinkError::modbus("truncated multi-register write"));
                }
                let count = buf.get_u16() as usize;
                let byte_count = buf.get_u8() as usize;
                if count == 0 || count > MAX_REGISTERS as usize || byte_count != count * 2 {
                    return Err(ComLinkError::modbus(format!(
                        "register count {} / byte count {} mismatch",
                        count, byte_count
                    )));
                }
                if buf.remaining() < byte_count {
                    return Err(ComLinkError::modbus("truncated register data"));
                }
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(buf.get_u16());
                }
                RequestBody::WriteMultipleRegisters { addr, values }
            }
        };

        Ok(ModbusRequest {
            txn_id,
            unit_id,
            func,
            body,
        })
    }
}

impl ModbusReply {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQ_HEADER + 8);
        buf.put_u16(self.txn_id);
        buf.put_u8(self.unit_id);

        match &self.body {
            ReplyBody::Exception(code) => {
                buf.put_u8(self.func as u8 | 0x80);
                buf.put_u8(*code as u8);
            }
            ReplyBody::Coils(values) => {
                let packed = pack_coils(values);
                buf.put_u8(self.func as u8);
                buf.put_u16(values.len() as u16);
                buf.put_u8(packed.len() as u8);
                buf.put_slice(&packed);
            }
            ReplyBody::Registers(values) => {
                buf.put_u8(self.func as u8);
                buf.put_u8((values.len() * 2) as u8);
                for v in values {
                    buf.put_u16(*v);
                }
            }
            ReplyBody::WriteAck { addr, value } => {
                buf.put_u8(self.func as u8);
                buf.put_u16(*addr);
                buf.put_u16(*value);
            }
            ReplyBody::WriteMultiAck { addr, count } => {
                buf.put_u8(self.func as u8);
                buf.put_u16(*addr);
                buf.put_u16(*count);
            }
        }
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < REQ_HEADER + 1 {
            return Err(ComLinkError::modbus(format!(
                "reply too short: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let txn_id = buf.get_u16();
        let unit_id = buf.get_u8();
        let raw_func = buf.get_u8();

        if raw_func & 0x80 != 0 {
            let func = FunctionCode::from_u8(raw_func & 0x7F)?;
            let code = ExceptionCode::from_u8(buf.get_u8())?;
            return Ok(ModbusReply {
                txn_id,
                unit_id,
                func,
                body: ReplyBody::Exception(code),
            });
        }

        let func = FunctionCode::from_u8(raw_func)?;
        let body = match func {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                if buf.remaining() < 3 {
                    return Err(ComLinkError::modbus("truncated coil reply"));
                }
                let count = buf.get_u16() as usize;
                let byte_count = buf.get_u8() as usize;
                if byte_count != count.div_ceil(8) || buf.remaining() < byte_count {
                    return Err(ComLinkError::modbus("coil reply length mismatch"));
                }
                ReplyBody::Coils(unpack_coils(&buf[..byte_count], count))
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                if buf.remaining() < 1 {
                    return Err(ComLinkError::modbus("truncated register reply"));
                }
                let byte_count = buf.get_u8() as usize;
                if byte_count % 2 != 0 || buf.remaining() < byte_count {
                    return Err(ComLinkError::modbus("register reply length mismatch"));
                }
                let mut values = Vec::with_capacity(byte_count / 2);
                for _ in 0..byte_count / 2 {
                    values.push(buf.get_u16());
                }
                ReplyBody::Registers(values)
            }
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
                if buf.remaining() < 4 {
                    return Err(ComLinkError::modbus("truncated write ack"));
                }
                ReplyBody::WriteAck {
                    addr: buf.get_u16(),
                    value: buf.get_u16(),
                }
            }
            FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
                if buf.remaining() < 4 {
                    return Err(ComLinkError::modbus("truncated multi-write ack"));
                }
                ReplyBody::WriteMultiAck {
                    addr: buf.get_u16(),
                    count: buf.get_u16(),
                }
            }
        };

        Ok(ModbusReply {
            txn_id,
            unit_id,
            func,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_roundtrip() {
        let req = ModbusRequest {
            txn_id: 0x1234,
            unit_id: 3,
            func: FunctionCode::ReadHoldingRegisters,
            body: RequestBody::Read { addr: 0x006B, count: 3 },
        };
        let wire = req.encode();
        assert_eq!(&wire[..], &[0x12, 0x34, 0x03, 0x03, 0x00, 0x6B, 0x00, 0x03]);
        assert_eq!(ModbusRequest::decode(&wire).unwrap(), req);
    }

    #[test]
    fn test_write_single_coil_roundtrip() {
        let req = ModbusRequest {
            txn_id: 1,
            unit_id: 1,
            func: FunctionCode::WriteSingleCoil,
            body: RequestBody::WriteSingleCoil { addr: 4, value: true },
        };
        let decoded = ModbusRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_write_multi_coils_roundtrip() {
        let values = vec![true, false, true, true, false, false, true, false, true];
        let req = ModbusRequest {
            txn_id: 7,
            unit_id: 2,
            func: FunctionCode::WriteMultipleCoils,
            body: RequestBody::WriteMultipleCoils { addr: 0x10, values: values.clone() },
        };
        match ModbusRequest::decode(&req.encode()).unwrap().body {
            RequestBody::WriteMultipleCoils { values: got, .. } => assert_eq!(got, values),
            other => panic!("wrong body: {:?}", other),
        }
    }

    #[test]
    fn test_write_multi_registers_roundtrip() {
        let req = ModbusRequest {
            txn_id: 9,
            unit_id: 5,
            func: FunctionCode::WriteMultipleRegisters,
            body: RequestBody::WriteMultipleRegisters {
                addr: 0x100,
                values: vec![0x000A, 0x0102],
            },
        };
        assert_eq!(ModbusRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_register_reply_roundtrip() {
        let reply = ModbusReply {
            txn_id: 0x1234,
            unit_id: 3,
            func: FunctionCode::ReadHoldingRegisters,
            body: ReplyBody::Registers(vec![0xAE41, 0x5652, 0x4340]),
        };
        assert_eq!(ModbusReply::decode(&reply.encode()).unwrap(), reply);
    }

    #[test]
    fn test_coil_reply_roundtrip() {
        let reply = ModbusReply {
            txn_id: 2,
            unit_id: 1,
            func: FunctionCode::ReadCoils,
            body: ReplyBody::Coils(vec![true, true, false, true, false]),
        };
        assert_eq!(ModbusReply::decode(&reply.encode()).unwrap(), reply);
    }

    #[test]
    fn test_exception_reply_roundtrip() {
        let req = ModbusRequest {
            txn_id: 5,
            unit_id: 9,
            func: FunctionCode::ReadInputRegisters,
            body: RequestBody::Read { addr: 0, count: 1 },
        };
        let reply = ModbusReply::exception(&req, ExceptionCode::IllegalDataAddress);
        let decoded = ModbusReply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded.body, ReplyBody::Exception(ExceptionCode::IllegalDataAddress));
        assert_eq!(decoded.func, FunctionCode::ReadInputRegisters);
        assert_eq!(decoded.txn_id, 5);
    }

    #[test]
    fn test_bad_coil_value_rejected() {
        // FC05 with a write value that is neither 0x0000 nor 0xFF00
        let wire = [0x00, 0x01, 0x01, 0x05, 0x00, 0x04, 0x12, 0x34];
        assert!(ModbusRequest::decode(&wire).is_err());
    }

    #[test]
    fn test_zero_count_read_rejected() {
        let req = ModbusRequest {
            txn_id: 1,
            unit_id: 1,
            func: FunctionCode::ReadCoils,
            body: RequestBody::Read { addr: 0, count: 0 },
        };
        assert!(ModbusRequest::decode(&req.encode()).is_err());
    }

    #[test]
    fn test_unknown_function_code() {
        let wire = [0x00, 0x01, 0x01, 0x2B, 0x00, 0x00, 0x00, 0x01];
        assert!(ModbusRequest::decode(&wire).is_err());
    }

    #[test]
    fn test_coil_packing_lsb_first() {
        assert_eq!(pack_coils(&[true, false, true]), vec![0b0000_0101]);
        assert_eq!(
            pack_coils(&[true; 9]),
            vec![0xFF, 0x01]
        );
        assert_eq!(unpack_coils(&[0b0000_0101], 3), vec![true, false, true]);
    }
}
