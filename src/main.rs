#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

fn main() {
    if let Err(e) = weather_alerts::run() {
        eprintln!("weather-alerts: {e}");
        std::process::exit(1);
    }
}
