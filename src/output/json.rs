use super::{Formatter, iso8601_timestamp};
use crate::anemo::Measurement;

pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, m: &Measurement) -> String {
        serde_json::json!({
            "ts": iso8601_timestamp(),
            "speed": m.speed,
            "course": m.course,
            "sound_speed": m.sound_speed,
            "speed_30s_avg": m.speed_30s_avg,
            "speed_30s_max": m.speed_30s_max,
            "err_code": m.err_code,
        })
        .to_string()
    }
}
