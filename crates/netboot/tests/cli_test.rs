//! Runs the netboot binary against the simulated bootloader

use std::io::Write;
use std::process::Output;
use std::sync::Arc;

use example_bootloader::{BootloaderConfig, BootloaderServer, SimulatedBootloader};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio::process::Command;

const FIRMWARE: &str = "\
S00600004844521B
S30908000000DEADBEEFB6
S70508000000F2
";

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

async fn netboot(port: u16, firmware: &NamedTempFile) -> Output {
    let config = write_file("");
    Command::new(env!("CARGO_BIN_EXE_netboot"))
        .arg("-d127.0.0.1")
        .arg(format!("-p{port}"))
        .arg("--no-color")
        .arg("--config")
        .arg(config.path())
        .arg(firmware.path())
        .output()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_update_transcript() {
    let bootloader = Arc::new(SimulatedBootloader::new(BootloaderConfig::default()));
    let server = BootloaderServer::bind("127.0.0.1:0", bootloader.clone())
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = server.spawn();

    let firmware = write_file(FIRMWARE);
    let output = netboot(port, &firmware).await;
    handle.abort();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("-> Total data bytes: 4"));
    assert!(stdout.contains("Connecting to bootloader...OK"));
    assert!(stdout.contains("Erasing 4 bytes starting at 0x08000000...OK"));
    assert!(stdout.contains("Programming data. Please wait...OK"));
    assert!(stdout.ends_with("Firmware successfully updated!\n"));

    assert_eq!(
        bootloader.read_memory(0x0800_0000, 4).unwrap(),
        vec![0xDE, 0xAD, 0xBE, 0xEF]
    );
}

#[tokio::test]
async fn test_connection_failure_exit_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let firmware = write_file(FIRMWARE);
    let output = netboot(port, &firmware).await;

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("Connecting to 127.0.0.1...ERROR"));
    assert!(stderr.contains("Error: Failed to open transport"));
}

#[tokio::test]
async fn test_invalid_firmware_exit_code() {
    let firmware = write_file("not an s-record\n");
    let output = netboot(1, &firmware).await;

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("...ERROR"));
}
