use super::Formatter;
use crate::anemo::Measurement;

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

fn format_course(course: f32) -> String {
    if course < 0.0 {
        "  --  ".to_string()
    } else {
        format!("{course:>5.1}°")
    }
}

impl Formatter for TextFormatter {
    fn format(&self, m: &Measurement) -> String {
        if self.verbose {
            format!(
                "Wind: {:>5.2} m/s from {} [c: {:>5.1} m/s, 30s avg: {:.2}, 30s max: {:.2}, err: {}]",
                m.speed,
                format_course(m.course),
                m.sound_speed,
                m.speed_30s_avg,
                m.speed_30s_max,
                m.err_code
            )
        } else {
            format!(
                "Wind: {:>5.2} m/s from {} (c: {:>5.1} m/s)",
                m.speed,
                format_course(m.course),
                m.sound_speed
            )
        }
    }
}
