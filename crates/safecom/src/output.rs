use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use safecom_core::ChannelSnapshot;
use safecom_pdu::{ConnectionPayload, DisconnectPayload, MessageType, Pdu};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DeliveryOutput {
    channel: u32,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_delivery(channel: u32, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DeliveryOutput {
                channel,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    channel.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} size={} payload={}",
                channel,
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

/// Raw output carries payload bytes only, so snapshots are skipped there.
pub fn print_snapshots(snapshots: &[ChannelSnapshot], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(snapshots).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "CHANNEL", "ROLE", "STATE", "SNT", "SNR", "CST", "CSR", "TI", "TRTD",
                    "UNCONFIRMED",
                ]);
            for s in snapshots {
                table.add_row(vec![
                    s.channel.to_string(),
                    s.role.to_string(),
                    s.state.to_string(),
                    s.snt.to_string(),
                    s.snr.to_string(),
                    s.cst.to_string(),
                    s.csr.to_string(),
                    s.ti.to_string(),
                    s.trtd.to_string(),
                    s.unconfirmed.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for s in snapshots {
                println!(
                    "channel={} role={} state={} snt={} snr={} cst={} csr={} ti={} trtd={}",
                    s.channel, s.role, s.state, s.snt, s.snr, s.cst, s.csr, s.ti, s.trtd
                );
            }
        }
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct PduOutput {
    message_type: &'static str,
    code: u16,
    message_length: usize,
    receiver_id: u32,
    sender_id: u32,
    sequence_number: u32,
    confirmed_sequence_number: u32,
    timestamp: u32,
    confirmed_timestamp: u32,
    payload_size: usize,
    payload: String,
    safety_code: String,
    safety_code_valid: bool,
}

pub fn print_pdu(pdu: &Pdu, safety_code_valid: bool, format: OutputFormat) {
    let out = PduOutput {
        message_type: pdu.message_type.name(),
        code: pdu.message_type.code(),
        message_length: pdu.message_length(),
        receiver_id: pdu.receiver_id,
        sender_id: pdu.sender_id,
        sequence_number: pdu.sequence_number,
        confirmed_sequence_number: pdu.confirmed_sequence_number,
        timestamp: pdu.timestamp,
        confirmed_timestamp: pdu.confirmed_timestamp,
        payload_size: pdu.payload.len(),
        payload: describe_payload(pdu),
        safety_code: hex::encode(pdu.safety_code),
        safety_code_valid,
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            let rows: [(&str, String); 13] = [
                ("message_type", out.message_type.to_string()),
                ("code", out.code.to_string()),
                ("message_length", out.message_length.to_string()),
                ("receiver_id", out.receiver_id.to_string()),
                ("sender_id", out.sender_id.to_string()),
                ("sequence_number", out.sequence_number.to_string()),
                (
                    "confirmed_sequence_number",
                    out.confirmed_sequence_number.to_string(),
                ),
                ("timestamp", out.timestamp.to_string()),
                ("confirmed_timestamp", out.confirmed_timestamp.to_string()),
                ("payload_size", out.payload_size.to_string()),
                ("payload", out.payload.clone()),
                ("safety_code", out.safety_code.clone()),
                ("safety_code_valid", out.safety_code_valid.to_string()),
            ];
            for (field, value) in rows {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} ({}) len={} {}->{} seq={} cseq={} ts={} cts={} payload={} code={} valid={}",
                out.message_type,
                out.code,
                out.message_length,
                out.sender_id,
                out.receiver_id,
                out.sequence_number,
                out.confirmed_sequence_number,
                out.timestamp,
                out.confirmed_timestamp,
                out.payload,
                out.safety_code,
                out.safety_code_valid
            );
        }
        OutputFormat::Raw => print_raw(pdu.payload.as_ref()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Human-readable payload: decoded for the fixed-layout message types,
/// a preview otherwise.
fn describe_payload(pdu: &Pdu) -> String {
    match pdu.message_type {
        MessageType::ConnectionRequest | MessageType::ConnectionResponse => {
            match ConnectionPayload::decode(&pdu.payload) {
                Ok(conn) => format!(
                    "version={} n_send_max={}",
                    String::from_utf8_lossy(&conn.version),
                    conn.n_send_max
                ),
                Err(_) => format!("<malformed {} bytes>", pdu.payload.len()),
            }
        }
        MessageType::DisconnectionRequest => match DisconnectPayload::decode(&pdu.payload) {
            Ok(disc) => format!("reason={} detail={}", disc.reason, disc.detail),
            Err(_) => format!("<malformed {} bytes>", pdu.payload.len()),
        },
        _ => payload_preview(pdu.payload.as_ref()),
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
