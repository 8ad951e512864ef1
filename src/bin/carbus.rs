use carbus::{
    props, AccessMode, AreaConfig, ChangeMode, ConfigDeclaration, DeclarationError,
    DeclarationSource, InMemorySource, PropertyBus, PropertyConfig, PropertyEventCallback,
    PropertyValue, RawPropValues, SubscribeOptions, UnconnectedRealBus,
};
use clap::{App, Arg};
use colored::*;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// Demo property ids following the vehicle property id encoding.
const INFO_MODEL: i32 = 286261505;
const ENGINE_RPM: i32 = 291504901;
const HVAC_FAN_SPEED: i32 = 356517120;

const SEAT_ROW_1_LEFT: i32 = 1;
const SEAT_ROW_1_RIGHT: i32 = 4;

/// Declaration source backed by a JSON file. The JSON grammar lives here,
/// outside the emulator core: serde hands over structured declarations.
struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    fn new(path: PathBuf) -> Self {
        let name = path.display().to_string();
        Self { path, name }
    }
}

impl DeclarationSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<ConfigDeclaration>, DeclarationError> {
        let file = File::open(&self.path).map_err(|e| DeclarationError::Io(e.to_string()))?;
        serde_json::from_reader(file).map_err(|e| DeclarationError::Parse(e.to_string()))
    }
}

struct PrintCallback;

impl PropertyEventCallback for PrintCallback {
    fn on_property_event(&self, value: PropertyValue) {
        println!(
            "{} prop={} area={} ts={}ns int32={:?} float={:?}",
            "EVENT".green().bold(),
            value.prop_id,
            value.area_id,
            value.timestamp,
            value.value.int32_values,
            value.value.float_values,
        );
    }
}

fn demo_declarations() -> Vec<ConfigDeclaration> {
    let model = PropertyConfig {
        prop_id: INFO_MODEL,
        access: AccessMode::Read,
        change_mode: ChangeMode::Static,
        area_configs: vec![],
        config_array: vec![],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: true,
    };

    let rpm = PropertyConfig {
        prop_id: ENGINE_RPM,
        access: AccessMode::Read,
        change_mode: ChangeMode::Continuous,
        area_configs: vec![],
        config_array: vec![],
        sample_rate_min: 1.0,
        sample_rate_max: 10.0,
        global: true,
    };

    let mut left = AreaConfig::new(SEAT_ROW_1_LEFT);
    left.min_int32_value = 0;
    left.max_int32_value = 6;
    let mut right = AreaConfig::new(SEAT_ROW_1_RIGHT);
    right.min_int32_value = 0;
    right.max_int32_value = 6;
    let fan_speed = PropertyConfig {
        prop_id: HVAC_FAN_SPEED,
        access: AccessMode::ReadWrite,
        change_mode: ChangeMode::OnChange,
        area_configs: vec![left, right],
        config_array: vec![],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: false,
    };

    let hvac_power = PropertyConfig {
        prop_id: props::HVAC_POWER_ON,
        access: AccessMode::ReadWrite,
        change_mode: ChangeMode::OnChange,
        area_configs: vec![AreaConfig::new(SEAT_ROW_1_LEFT | SEAT_ROW_1_RIGHT)],
        config_array: vec![HVAC_FAN_SPEED],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: false,
    };

    vec![
        ConfigDeclaration::new(model).with_initial_value(RawPropValues::string("Emulated Vehicle")),
        ConfigDeclaration::new(rpm).with_initial_value(RawPropValues::float(vec![800.0])),
        ConfigDeclaration::new(fan_speed)
            .with_initial_value(RawPropValues::int32(vec![1]))
            .with_area_value(SEAT_ROW_1_RIGHT, RawPropValues::int32(vec![2])),
        ConfigDeclaration::new(hvac_power)
            .with_initial_value(RawPropValues::int32(vec![1]))
            .with_area_value(
                SEAT_ROW_1_LEFT | SEAT_ROW_1_RIGHT,
                RawPropValues::int32(vec![1]),
            ),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("carbus")
        .version("0.1.0")
        .author("Vehicle Platform Engineering Team")
        .about("🚗 Vehicle Property Bus Emulator - typed area-scoped properties with change subscriptions")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON declaration overlay applied on top of the built-in demo set")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("How long to run the demo loop")
                .takes_value(true)
                .default_value("6")
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Duration must be a valid number of seconds".into()),
                }),
        )
        .arg(
            Arg::with_name("rate")
                .short("r")
                .long("rate")
                .value_name("HZ")
                .help("Requested sample rate for the continuous demo property")
                .takes_value(true)
                .default_value("5")
                .validator(|v| match v.parse::<f32>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Rate must be a valid number in Hz".into()),
                }),
        )
        .get_matches();

    let duration: u64 = matches.value_of("duration").unwrap_or("6").parse()?;
    let rate: f32 = matches.value_of("rate").unwrap_or("5").parse()?;

    println!("{}", "🚗 Vehicle Property Bus Emulator".bold());
    println!("=================================");

    let baseline = InMemorySource::new("built-in demo set", demo_declarations());
    let overlay = matches
        .value_of("config")
        .map(|path| JsonFileSource::new(PathBuf::from(path)));
    let overlays: Vec<&dyn DeclarationSource> = overlay
        .as_ref()
        .map(|o| vec![o as &dyn DeclarationSource])
        .unwrap_or_default();

    let bus = PropertyBus::new(Arc::new(UnconnectedRealBus), &baseline, &overlays)?;
    println!(
        "   {} properties configured",
        bus.all_property_configs().len().to_string().cyan()
    );

    let model = bus.get(INFO_MODEL, 0)?;
    println!(
        "   model: {}",
        model.value.string_value.unwrap_or_default().cyan()
    );

    let client = bus.new_subscription_client(Arc::new(PrintCallback));
    bus.subscribe(
        &client,
        &[
            SubscribeOptions {
                prop_id: ENGINE_RPM,
                area_ids: vec![],
                sample_rate: rate,
            },
            SubscribeOptions {
                prop_id: HVAC_FAN_SPEED,
                area_ids: vec![],
                sample_rate: 0.0,
            },
        ],
    )?;
    println!(
        "📡 subscribed: engine rpm at {} Hz (clamped into config bounds), fan speed on-change",
        rate
    );

    for second in 0..duration {
        std::thread::sleep(Duration::from_secs(1));

        // Cycle the fan speed through its valid range to trigger on-change
        // events.
        let speed = (second % 7) as i32;
        bus.set(PropertyValue::new(
            HVAC_FAN_SPEED,
            SEAT_ROW_1_LEFT,
            0,
            RawPropValues::int32(vec![speed]),
        ))?;

        let current = bus.get(HVAC_FAN_SPEED, SEAT_ROW_1_LEFT)?;
        println!(
            "{} fan speed (left) = {:?}",
            "GET  ".blue().bold(),
            current.value.int32_values
        );
    }

    bus.unsubscribe(&client, ENGINE_RPM)?;
    bus.unsubscribe(&client, HVAC_FAN_SPEED)?;
    bus.disconnect_client(client);

    println!("{}", "🚗 emulator demo finished".bold());
    Ok(())
}
