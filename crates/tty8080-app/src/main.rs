slint::include_modules!();

mod config;

use anyhow::Result;
use config::HarnessConfig;
use std::cell::RefCell;
use std::rc::Rc;
use tty8080_core::{
    describe_byte, ConnectionSettings, Console, DataBits, Direction, MemoryTransport, Notifier,
    SerialPortTransport, SerialTransport, SettingsStore, TextEncoding, TrafficLog,
};

fn main() -> Result<()> {
    env_logger::init();

    let config_dir = HarnessConfig::config_dir();
    let harness = HarnessConfig::load(&config_dir)?;
    log::info!("harness config: {harness:?}");

    let (notifier, reports) = Notifier::channel();
    let transport: Box<dyn SerialTransport> = if harness.loopback {
        Box::new(MemoryTransport::loopback())
    } else {
        Box::new(SerialPortTransport)
    };
    let console = Rc::new(Console::new(
        harness.console_config(),
        SettingsStore::new(harness.settings_dir(&config_dir), notifier.clone()),
        transport,
        notifier,
    ));
    let ports = console.ports();
    // Failures land in `reports` and show up in the log pane.
    let _ = console.open_connection();

    let app = MainWindow::new()?;
    let traffic = Rc::new(RefCell::new(TrafficLog::new(10000)));

    refresh_ports(&app);
    show_settings(&app, &console);

    // Send byte
    {
        let app_weak = app.as_weak();
        let console = console.clone();
        let traffic = traffic.clone();

        app.on_send_byte_clicked(move || {
            let app = app_weak.unwrap();
            match parse_hex_bytes(&app.get_byte_to_send()) {
                Ok(bytes) => {
                    for &b in &bytes {
                        console.byte_from_cpu(ports.data_out, b);
                    }
                    traffic.borrow_mut().push(Direction::FromCpu, bytes);
                }
                Err(e) => traffic.borrow_mut().notice(e),
            }
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Send string
    {
        let app_weak = app.as_weak();
        let console = console.clone();
        let traffic = traffic.clone();

        app.on_send_string_clicked(move || {
            let app = app_weak.unwrap();
            let bytes = app.get_string_to_send().as_bytes().to_vec();
            for &b in &bytes {
                console.byte_from_cpu(ports.data_out, b);
            }
            traffic.borrow_mut().push(Direction::FromCpu, bytes);
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Get status
    {
        let app_weak = app.as_weak();
        let console = console.clone();

        app.on_get_status_clicked(move || {
            let app = app_weak.unwrap();
            let status = console.byte_to_cpu(ports.status);
            app.set_status_received(status.to_string().into());
        });
    }

    // Get byte; only touches the blocking data port when something is queued
    {
        let app_weak = app.as_weak();
        let console = console.clone();
        let traffic = traffic.clone();

        app.on_get_byte_clicked(move || {
            let app = app_weak.unwrap();
            let status = console.byte_to_cpu(ports.status);
            app.set_status_received(status.to_string().into());
            if status == 0 {
                return;
            }
            let b = console.byte_to_cpu(ports.data_in);
            app.set_byte_received(describe_byte(b).into());
            traffic.borrow_mut().push(Direction::ToCpu, vec![b]);
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Get all bytes
    {
        let app_weak = app.as_weak();
        let console = console.clone();
        let traffic = traffic.clone();

        app.on_get_all_bytes_clicked(move || {
            let app = app_weak.unwrap();
            let mut received = Vec::new();
            while console.byte_to_cpu(ports.status) >= 1 {
                received.push(console.byte_to_cpu(ports.data_in));
            }
            app.set_status_received("0".into());
            if received.is_empty() {
                return;
            }
            let shown: Vec<String> = received
                .iter()
                .map(|&b| format!("{b:02X}-{}", TextEncoding::Ascii.decode(&[b])))
                .collect();
            app.set_all_bytes_received(shown.join(" | ").into());
            traffic.borrow_mut().push(Direction::ToCpu, received);
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Set connection values
    {
        let app_weak = app.as_weak();
        let console = console.clone();
        let traffic = traffic.clone();

        app.on_apply_settings_clicked(move || {
            let app = app_weak.unwrap();
            match settings_from_form(&app) {
                Ok(settings) => {
                    if console.reconfigure(settings).is_ok() {
                        traffic.borrow_mut().notice(format!("connected {}", console.settings()));
                    }
                }
                Err(e) => traffic.borrow_mut().notice(e),
            }
            show_settings(&app, &console);
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Refresh ports button
    {
        let app_weak = app.as_weak();
        app.on_refresh_ports_clicked(move || {
            let app = app_weak.unwrap();
            refresh_ports(&app);
        });
    }

    // Clear button
    {
        let app_weak = app.as_weak();
        let traffic = traffic.clone();

        app.on_clear_clicked(move || {
            let app = app_weak.unwrap();
            traffic.borrow_mut().clear();
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Display options changed
    {
        let app_weak = app.as_weak();
        let traffic = traffic.clone();
        app.on_display_options_changed(move || {
            let app = app_weak.unwrap();
            update_log_display(&app, &traffic.borrow());
        });
    }

    // Report polling timer
    let app_weak = app.as_weak();
    let console_clone = console.clone();
    let traffic_clone = traffic.clone();

    let _timer = slint::Timer::default();
    _timer.start(slint::TimerMode::Repeated, std::time::Duration::from_millis(100), move || {
        let app = app_weak.unwrap();
        let mut changed = false;
        while let Ok(report) = reports.try_recv() {
            traffic_clone.borrow_mut().notice(report.to_string());
            changed = true;
        }
        if changed {
            update_log_display(&app, &traffic_clone.borrow());
        }
        app.set_is_connected(console_clone.is_connected());
    });

    app.run()?;

    let _ = console.close_connection();
    Ok(())
}

/// Parses the "Send Byte" field: one or more hex bytes, a lone digit is
/// zero-padded. Blank input is rejected rather than sent as NUL.
fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("nothing to send: enter a hex byte".to_string());
    }
    hex::decode(format!("{text:0>2}")).map_err(|e| format!("not a hex byte: {text:?} ({e})"))
}

fn settings_from_form(app: &MainWindow) -> Result<ConnectionSettings, String> {
    let port_name = app.get_selected_port().to_string();
    let port_name = port_name.split_whitespace().next().unwrap_or_default().to_string();
    if port_name.is_empty() {
        return Err("no serial port selected".to_string());
    }
    let baud_rate = app
        .get_baud_rate()
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid baud rate: {e}"))?;
    let data_bits = app
        .get_data_bits()
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(DataBits::from_count)
        .ok_or_else(|| format!("invalid data bits: {}", app.get_data_bits()))?;

    Ok(ConnectionSettings {
        port_name,
        baud_rate,
        data_bits,
        stop_bits: app.get_stop_bits().parse()?,
        parity: app.get_parity().parse()?,
    })
}

fn show_settings(app: &MainWindow, console: &Console) {
    let settings = console.settings();
    app.set_selected_port(settings.port_name.clone().into());
    app.set_baud_rate(settings.baud_rate.to_string().into());
    app.set_data_bits(settings.data_bits.count().to_string().into());
    app.set_stop_bits(settings.stop_bits.to_string().into());
    app.set_parity(settings.parity.to_string().into());
    app.set_connection_string(settings.to_string().into());
    app.set_is_connected(console.is_connected());
}

fn refresh_ports(app: &MainWindow) {
    let ports = SerialPortTransport::list_ports();
    let port_names: Vec<slint::SharedString> = ports.iter().map(|p| {
        if let (Some(vid), Some(pid)) = (p.vid, p.pid) {
            format!("{} ({:04X}:{:04X})", p.port_name, vid, pid).into()
        } else {
            p.port_name.clone().into()
        }
    }).collect();

    let port_list = Rc::new(slint::VecModel::from(port_names.clone()));
    app.set_port_list(port_list.into());

    if !port_names.is_empty() && app.get_selected_port().is_empty() {
        app.set_selected_port(port_names[0].clone());
    }
}

fn update_log_display(app: &MainWindow, traffic: &TrafficLog) {
    let text = traffic.to_text(app.get_show_hex(), TextEncoding::Auto);
    app.set_log_text(text.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_field_parsing() {
        assert_eq!(parse_hex_bytes("41"), Ok(vec![0x41]));
        assert_eq!(parse_hex_bytes(" a "), Ok(vec![0x0A]));
        assert_eq!(parse_hex_bytes("4142"), Ok(vec![0x41, 0x42]));
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn blank_hex_field_sends_nothing() {
        assert!(parse_hex_bytes("").is_err());
        assert!(parse_hex_bytes("   ").is_err());
    }
}
