//! Per-command JSON Schema registry (§4.3). Validation is advisory at the
//! edge: an unregistered command type passes through untouched (dispatch
//! refuses it downstream); a registered type's `data` is checked against its
//! schema and violations are reported back as human-readable reasons.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;

pub struct SchemaRegistry {
    schemas: HashMap<String, Value>,
}

impl SchemaRegistry {
    pub fn new() -> SchemaRegistry {
        SchemaRegistry {
            schemas: HashMap::new(),
        }
    }

    /// Registers a schema document for a command type. An engineer adding a
    /// new command calls this once at startup; there is no runtime mutation
    /// path beyond this call.
    pub fn register(&mut self, command_type: impl Into<String>, schema: Value) {
        self.schemas.insert(command_type.into(), schema);
    }

    /// Validates `data` against the schema registered for `command_type`.
    /// Returns `Ok(())` for an unregistered type (advisory at the edge) or
    /// for a passing validation; `Err` carries one reason string per
    /// violation.
    pub fn validate(&self, command_type: &str, data: &Value) -> Result<(), Vec<String>> {
        let schema = match self.schemas.get(command_type) {
            Some(schema) => schema,
            None => return Ok(()),
        };

        let compiled = match JSONSchema::compile(schema) {
            Ok(compiled) => compiled,
            Err(e) => return Err(vec![format!("invalid schema for {}: {}", command_type, e)]),
        };

        match compiled.validate(data) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors.map(|e| e.to_string()).collect()),
        }
    }

    pub fn is_registered(&self, command_type: &str) -> bool {
        self.schemas.contains_key(command_type)
    }
}

impl Default for SchemaRegistry {
    fn default() -> SchemaRegistry {
        SchemaRegistry::new()
    }
}

/// The small, fixed set of inter-process command payload shapes checked by
/// hand rather than via the registry (§4.3 "A separate S2S validator checks
/// a small fixed set of inter-process command payload shapes (health,
/// broadcast sweep, command push) by hand").
pub mod s2s {
    use serde_json::Value;

    pub fn validate_health(payload: &Value) -> Result<(), &'static str> {
        if !payload.is_object() {
            return Err("health payload must be an object");
        }
        Ok(())
    }

    pub fn validate_broadcast_sweep(payload: &Value) -> Result<(), &'static str> {
        let obj = payload.as_object().ok_or("broadcast sweep payload must be an object")?;
        if !obj.get("event_type").map_or(false, Value::is_string) {
            return Err("broadcast sweep requires a string event_type");
        }
        if !obj.contains_key("data") {
            return Err("broadcast sweep requires a data field");
        }
        Ok(())
    }

    pub fn validate_command_push(payload: &Value) -> Result<(), &'static str> {
        let obj = payload.as_object().ok_or("command push payload must be an object")?;
        if !obj.get("cmd_type").map_or(false, Value::is_string) {
            return Err("command push requires a string cmd_type");
        }
        if !obj.get("data").map_or(false, Value::is_object) {
            return Err("command push requires an object data field");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unregistered_type_passes_through() {
        let registry = SchemaRegistry::new();
        assert!(registry.validate("unknown.command", &json!({"anything": 1})).is_ok());
    }

    #[test]
    fn registered_type_rejects_violating_payload() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            "trade.buy",
            json!({
                "type": "object",
                "required": ["port_id", "quantity"],
                "properties": {
                    "port_id": {"type": "integer"},
                    "quantity": {"type": "integer", "minimum": 1}
                }
            }),
        );

        assert!(registry.validate("trade.buy", &json!({"port_id": 4, "quantity": 10})).is_ok());
        assert!(registry.validate("trade.buy", &json!({"port_id": 4})).is_err());
        assert!(registry.validate("trade.buy", &json!({"port_id": 4, "quantity": 0})).is_err());
    }

    #[test]
    fn s2s_broadcast_sweep_requires_event_type() {
        assert!(s2s::validate_broadcast_sweep(&json!({"event_type": "notice", "data": {}})).is_ok());
        assert!(s2s::validate_broadcast_sweep(&json!({"data": {}})).is_err());
    }
}
