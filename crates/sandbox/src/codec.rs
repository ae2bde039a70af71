//! # JSON Lines Wire Codec
//!
//! The sandbox wire format: one JSON object per line, naming the packet
//! type and listing the packet's fields in slot order.
//!
//! ```text
//! {"type":"SetProtocol","fields":[765,"localhost",25565,2]}
//! {"type":"Chat","fields":["hello",0]}
//! ```
//!
//! Inbound frames are looked up in the connection's current protocol
//! stage. Missing trailing fields keep their defaults; extra fields are an
//! error. Enum fields travel as their constant name, nested objects as an
//! array of their fields.

use crate::host::SandboxHost;
use packettap_core::{Result, TapError};
use packettap_network::{Flow, Message, Stage, StageContext};
use packettap_protocol::{Direction, PacketType, ProtocolStage};
use packettap_reflect::{populate_defaults, ClassTable, Instance, Value, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;

/// One line on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    /// Logical packet name, e.g. `Chat`
    #[serde(rename = "type")]
    pub packet: String,
    #[serde(default)]
    pub fields: Vec<Json>,
}

impl WireFrame {
    pub fn new(packet: impl Into<String>, fields: Vec<Json>) -> Self {
        Self {
            packet: packet.into(),
            fields,
        }
    }
}

/// Decode one inbound line received while the connection is in `stage`
pub fn decode_frame(host: &SandboxHost, stage: ProtocolStage, line: &[u8]) -> Result<Instance> {
    let frame: WireFrame =
        serde_json::from_slice(line).map_err(|e| TapError::InvalidData(format!("malformed frame: {}", e)))?;

    let packet = PacketType::lookup(stage, Direction::Inbound, &frame.packet).ok_or_else(|| {
        TapError::UnsupportedPacket {
            packet: frame.packet.clone(),
            reason: format!("not an inbound {} packet", stage),
        }
    })?;
    let class = host.class_for(packet).ok_or_else(|| TapError::UnsupportedPacket {
        packet: packet.to_string(),
        reason: "not implemented by this server".to_string(),
    })?;

    let mut instance = Instance::new(class);
    populate_defaults(&mut instance, host.classes(), 0);
    fill_slots(&mut instance, &frame.fields, host.classes())?;
    Ok(instance)
}

/// Encode one outbound packet; `stage` disambiguates shared classes
pub fn encode_frame(host: &SandboxHost, stage: ProtocolStage, packet: &Instance) -> Result<String> {
    let class_name = packet.class_name();
    let packet_type = host
        .packet_of(stage, Direction::Outbound, class_name)
        .or_else(|| {
            host.packets()
                .iter()
                .find(|entry| entry.packet.direction() == Direction::Outbound && entry.class.name() == class_name)
                .map(|entry| entry.packet)
        })
        .ok_or_else(|| TapError::UnsupportedPacket {
            packet: class_name.to_string(),
            reason: "not an outbound packet class".to_string(),
        })?;

    let frame = WireFrame::new(packet_type.name(), packet.slots().iter().map(to_json).collect());
    serde_json::to_string(&frame).map_err(|e| TapError::InvalidData(e.to_string()))
}

fn fill_slots(instance: &mut Instance, fields: &[Json], classes: &ClassTable) -> Result<()> {
    let types: Vec<ValueType> = instance
        .class()
        .slot_fields()
        .into_iter()
        .map(|field| field.ty.clone())
        .collect();
    if fields.len() > types.len() {
        return Err(TapError::InvalidData(format!(
            "{} has {} fields, frame has {}",
            instance.class_name(),
            types.len(),
            fields.len()
        )));
    }

    for (index, (ty, json)) in types.iter().zip(fields).enumerate() {
        instance.slots_mut()[index] = from_json(ty, json, classes)?;
    }
    Ok(())
}

/// JSON form of a field value
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::from(*v),
        Value::Byte(v) => Json::from(*v),
        Value::Short(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::Long(v) => Json::from(*v),
        Value::Float(v) => Json::from(*v),
        Value::Double(v) => Json::from(*v),
        Value::String(v) => Json::from(v.as_str()),
        Value::Bytes(v) => Json::from(v.clone()),
        Value::Enum { constant, .. } => Json::from(constant.as_str()),
        Value::Object(instance) => Json::Array(instance.slots().iter().map(to_json).collect()),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
    }
}

/// Field value of type `ty` from its JSON form
pub fn from_json(ty: &ValueType, json: &Json, classes: &ClassTable) -> Result<Value> {
    let invalid = || TapError::InvalidData(format!("expected {}, found {}", ty, json));

    if json.is_null() {
        return if ty.is_primitive() { Err(invalid()) } else { Ok(Value::Null) };
    }

    let value = match ty {
        ValueType::Bool => Value::Bool(json.as_bool().ok_or_else(invalid)?),
        ValueType::Byte => Value::Byte(integer(json).ok_or_else(invalid)?),
        ValueType::Short => Value::Short(integer(json).ok_or_else(invalid)?),
        ValueType::Int => Value::Int(integer(json).ok_or_else(invalid)?),
        ValueType::Long => Value::Long(json.as_i64().ok_or_else(invalid)?),
        ValueType::Float => Value::Float(json.as_f64().ok_or_else(invalid)? as f32),
        ValueType::Double => Value::Double(json.as_f64().ok_or_else(invalid)?),
        ValueType::String => Value::string(json.as_str().ok_or_else(invalid)?),
        ValueType::Bytes => Value::Bytes(
            json.as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|item| integer(item).ok_or_else(invalid))
                .collect::<Result<_>>()?,
        ),
        ValueType::Enum(class) => {
            let constant = json.as_str().ok_or_else(invalid)?;
            let known = classes
                .get(class)
                .is_some_and(|def| def.enum_constants().iter().any(|c| c == constant));
            if !known {
                return Err(invalid());
            }
            Value::enum_constant(class.clone(), constant)
        }
        ValueType::Object(class) => {
            let def = classes
                .get(class)
                .ok_or_else(|| TapError::InvalidData(format!("unknown class {}", class)))?;
            let mut nested = Instance::new(&def);
            populate_defaults(&mut nested, classes, 0);
            fill_slots(&mut nested, json.as_array().ok_or_else(invalid)?, classes)?;
            Value::object(nested)
        }
        ValueType::List(inner) => Value::List(
            json.as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|item| from_json(inner, item, classes))
                .collect::<Result<_>>()?,
        ),
        ValueType::Optional(inner) => from_json(inner, json, classes)?,
        ValueType::Any => match json {
            Json::Bool(v) => Value::Bool(*v),
            Json::String(v) => Value::string(v.as_str()),
            Json::Number(n) => match n.as_i64() {
                Some(v) => Value::Long(v),
                None => Value::Double(n.as_f64().ok_or_else(invalid)?),
            },
            _ => return Err(invalid()),
        },
    };
    Ok(value)
}

fn integer<T: TryFrom<i64>>(json: &Json) -> Option<T> {
    json.as_i64().and_then(|v| T::try_from(v).ok())
}

/// Wire to packet, after the frame splitter
pub struct JsonDecoder {
    host: Arc<SandboxHost>,
}

impl JsonDecoder {
    pub fn new(host: Arc<SandboxHost>) -> Self {
        Self { host }
    }
}

impl Stage for JsonDecoder {
    fn handle_inbound(&self, ctx: &StageContext<'_>, message: Message) -> Flow {
        let bytes = match message {
            Message::Wire(bytes) => bytes,
            other => return Flow::Continue(other),
        };
        let channel = ctx.channel();
        match decode_frame(&self.host, channel.protocol_stage(), &bytes) {
            Ok(packet) => Flow::Continue(Message::packet(packet)),
            Err(e) => {
                tracing::warn!("Connection {} sent an undecodable frame: {}", channel.id(), e);
                Flow::Stop
            }
        }
    }
}

/// Packet to wire
pub struct JsonEncoder {
    host: Arc<SandboxHost>,
}

impl JsonEncoder {
    pub fn new(host: Arc<SandboxHost>) -> Self {
        Self { host }
    }
}

impl Stage for JsonEncoder {
    fn handle_outbound(&self, ctx: &StageContext<'_>, message: Message) -> Flow {
        let envelope = match message {
            Message::Packet(envelope) => envelope,
            other => return Flow::Continue(other),
        };
        let channel = ctx.channel();
        match encode_frame(&self.host, channel.protocol_stage(), &envelope.packet) {
            Ok(line) => Flow::Continue(Message::wire(line)),
            Err(e) => {
                tracing::warn!("Connection {}: dropping unencodable packet: {}", channel.id(), e);
                Flow::Stop
            }
        }
    }
}
