use std::fs;

use safecom_pdu::{decode_pdu, PduError};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, pdu_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_pdu, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = resolve_bytes(&args)?;
    let pdu = decode_pdu(&bytes).map_err(|err| pdu_error("decode failed", err))?;

    match pdu.verify() {
        Ok(()) => {
            print_pdu(&pdu, true, format);
            Ok(SUCCESS)
        }
        Err(PduError::SafetyCodeMismatch) => {
            print_pdu(&pdu, false, format);
            Ok(DATA_INVALID)
        }
        Err(err) => Err(pdu_error("verify failed", err)),
    }
}

fn resolve_bytes(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let text = args.hex.as_deref().unwrap_or_default();
    parse_hex(text)
}

/// Hex digits, optionally separated by whitespace or colons.
fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    hex::decode(digits).map_err(|err| CliError::new(USAGE, format!("invalid hex input: {err}")))
}
