use super::{Formatter, iso8601_timestamp};
use crate::anemo::Measurement;

pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, m: &Measurement) -> String {
        format!(
            "{},{:.2},{:.1},{:.1},{:.2},{:.2},{}",
            iso8601_timestamp(),
            m.speed,
            m.course,
            m.sound_speed,
            m.speed_30s_avg,
            m.speed_30s_max,
            m.err_code
        )
    }

    fn header(&self) -> Option<&'static str> {
        Some("ts,speed,course,sound_speed,speed_30s_avg,speed_30s_max,err_code")
    }
}
