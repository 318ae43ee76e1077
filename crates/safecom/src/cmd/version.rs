use safecom_pdu::PROTOCOL_VERSION;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("safecom {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: safecom");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "protocol_version: {}",
        String::from_utf8_lossy(&PROTOCOL_VERSION)
    );
    println!(
        "build_target: {}",
        option_env!("SAFECOM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);

    Ok(SUCCESS)
}
