fn main() {
    // The linker re-runs this script with arguments when it hits an error
    handle_linker_error();

    // Load .env file for WiFi configuration
    load_env_config();

    // Host builds (unit tests) link against std and must not see the ESP linker scripts
    if std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "none" {
        return;
    }

    if let Ok(exe) = std::env::current_exe() {
        println!("cargo:rustc-link-arg=--error-handling-script={}", exe.display());
    }
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Load environment configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    // Tell cargo to rerun if environment variables change
    println!("cargo:rerun-if-env-changed=WIFI_SSID");
    println!("cargo:rerun-if-env-changed=WIFI_PASSWORD");

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    // Get WiFi credentials with fallbacks
    // Note: We need to handle the case where env vars are set to empty strings
    let wifi_ssid = env::var("WIFI_SSID")
        .unwrap_or_else(|_| String::new())
        .trim()
        .to_string();
    let wifi_password = env::var("WIFI_PASSWORD")
        .unwrap_or_else(|_| String::new())
        .trim()
        .to_string();

    // Set environment variables for the compilation
    println!("cargo:rustc-env=WIFI_SSID={}", wifi_ssid);
    println!("cargo:rustc-env=WIFI_PASSWORD={}", wifi_password);

    // Print status
    if wifi_ssid.is_empty() {
        println!("cargo:warning=WIFI_SSID is empty - the device will report Error");
    } else {
        println!("cargo:warning=WIFI_SSID configured: {}", wifi_ssid);
    }

    if wifi_password.is_empty() {
        println!("cargo:warning=WIFI_PASSWORD is empty - joining an open network");
    } else {
        println!("cargo:warning=WIFI_PASSWORD configured (length: {})", wifi_password.len());
    }
}

/// Hint for an undefined symbol reported by the linker
fn missing_symbol_hint(symbol: &str) -> Option<&'static str> {
    match symbol {
        "_stack_start" => Some("Is the linker script `linkall.x` missing?"),
        "esp_wifi_preempt_enable" | "esp_wifi_preempt_yield_task" | "esp_wifi_preempt_task_create" => {
            Some("`esp-wifi` has no scheduler enabled; keep its `builtin-scheduler` feature on.")
        }
        _ => None,
    }
}

/// Print a hint and exit when invoked as the linker's error handler
fn handle_linker_error() {
    let args: Vec<String> = std::env::args().collect();
    let [_, kind, what, ..] = args.as_slice() else {
        return;
    };

    if kind != "undefined-symbol" {
        std::process::exit(1);
    }
    if let Some(hint) = missing_symbol_hint(what) {
        eprintln!();
        eprintln!("💡 {hint}");
        eprintln!();
    }
    std::process::exit(0);
}
