use chrono::Utc;

use crate::driver::item::{ItemData, Quality};
use crate::driver::value::Value;
use crate::modbus::address::ProtocolAddress;
use crate::utils::error::ModbusError;

pub trait ItemFormatter: Send + Sync {
    fn format_item(&self, address: &ProtocolAddress, item: &ItemData<Value>) -> String;
    fn format_write(&self, address: &ProtocolAddress, value: &Value, result: &Result<(), ModbusError>) -> String;
    fn format_summary(&self, total: u64, good: u64) -> String;
    fn format_header(&self) -> String;
}

/// Success rate in percent; 0 when nothing was attempted.
pub fn success_rate(total: u64, good: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        good as f64 * 100.0 / total as f64
    }
}

pub struct ConsoleFormatter;

impl ItemFormatter for ConsoleFormatter {
    fn format_item(&self, address: &ProtocolAddress, item: &ItemData<Value>) -> String {
        match item.quality {
            Quality::Good => format!(
                "✅ {} [{}] = {} ({})",
                address,
                item.value.data_type(),
                item.value,
                item.timestamp.format("%H:%M:%S%.3f")
            ),
            Quality::Bad => format!(
                "❌ {} [{}] = BAD ({})",
                address,
                item.value.data_type(),
                item.timestamp.format("%H:%M:%S%.3f")
            ),
        }
    }

    fn format_write(&self, address: &ProtocolAddress, value: &Value, result: &Result<(), ModbusError>) -> String {
        match result {
            Ok(()) => format!("✅ {} <- {}", address, value),
            Err(e) => format!("❌ {} <- {} failed: {} (status {})", address, value, e, e.code()),
        }
    }

    fn format_summary(&self, total: u64, good: u64) -> String {
        format!(
            "📊 {} reads, {} good, success rate {:.1}%",
            total,
            good,
            success_rate(total, good)
        )
    }

    fn format_header(&self) -> String {
        format!("🚀 Modbus RTU - {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl ItemFormatter for JsonFormatter {
    fn format_item(&self, address: &ProtocolAddress, item: &ItemData<Value>) -> String {
        let json_data = serde_json::json!({
            "address": address.to_string(),
            "type": item.value.data_type().to_string(),
            "value": item.value,
            "quality": item.quality,
            "timestamp": item.timestamp.to_rfc3339(),
        });

        serde_json::to_string(&json_data).unwrap_or_default()
    }

    fn format_write(&self, address: &ProtocolAddress, value: &Value, result: &Result<(), ModbusError>) -> String {
        let json_data = serde_json::json!({
            "address": address.to_string(),
            "value": value,
            "ok": result.is_ok(),
            "status": result.as_ref().err().map(|e| e.code()),
            "error": result.as_ref().err().map(|e| e.to_string()),
            "timestamp": Utc::now().to_rfc3339(),
        });

        serde_json::to_string(&json_data).unwrap_or_default()
    }

    fn format_summary(&self, total: u64, good: u64) -> String {
        let json_data = serde_json::json!({
            "total": total,
            "good": good,
            "success_rate": success_rate(total, good),
        });

        serde_json::to_string(&json_data).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }
}

pub struct CsvFormatter;

impl ItemFormatter for CsvFormatter {
    fn format_item(&self, address: &ProtocolAddress, item: &ItemData<Value>) -> String {
        let quality = match item.quality {
            Quality::Good => "good",
            Quality::Bad => "bad",
        };
        format!(
            "{},{},{},{},{}",
            item.timestamp.to_rfc3339(),
            address,
            item.value.data_type(),
            csv_field(&item.value.to_string()),
            quality
        )
    }

    fn format_write(&self, address: &ProtocolAddress, value: &Value, result: &Result<(), ModbusError>) -> String {
        let status = result.as_ref().err().map(|e| e.code()).unwrap_or(0);
        format!(
            "{},{},{},{},{}",
            Utc::now().to_rfc3339(),
            address,
            value.data_type(),
            csv_field(&value.to_string()),
            status
        )
    }

    fn format_summary(&self, total: u64, good: u64) -> String {
        format!("# total={},good={},success_rate={:.1}", total, good, success_rate(total, good))
    }

    fn format_header(&self) -> String {
        "timestamp,address,type,value,quality".to_string()
    }
}

fn csv_field(text: &str) -> String {
    if text.contains(',') || text.contains('"') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

pub fn formatter_for(name: &str) -> Option<Box<dyn ItemFormatter>> {
    match name {
        "console" => Some(Box::new(ConsoleFormatter)),
        "json" => Some(Box::new(JsonFormatter)),
        "csv" => Some(Box::new(CsvFormatter)),
        _ => None,
    }
}
