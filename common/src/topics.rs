pub const TOPIC_RELAY_COMMAND: &str = "thermostat/relay/command";
pub const TOPIC_RELAY_STATE: &str = "thermostat/relay/state";

pub const TOPIC_WEATHER_FORECAST: &str = "thermostat/weather/forecast";

pub const TOPIC_CONTROLLER_STATE: &str = "thermostat/controller/state";
pub const TOPIC_CONTROLLER_ALERT: &str = "thermostat/controller/alert";
