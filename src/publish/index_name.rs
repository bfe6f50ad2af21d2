use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Index-name template such as `techlog-{stream}-yyyy.MM.dd`.
///
/// Date tokens (`yyyy`, `MM`, `dd`, `hh`, `mm`, `ss`) are replaced first with
/// unpadded wall-clock values, then `{stream}` (or its alias `{event}`) with
/// the stream name. Index names are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNameTemplate {
    template: String,
}

impl IndexNameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render<Tz: TimeZone>(&self, stream: &str, now: &DateTime<Tz>) -> String {
        let dated = self
            .template
            .replace("yyyy", &now.year().to_string())
            .replace("MM", &now.month().to_string())
            .replace("dd", &now.day().to_string())
            .replace("hh", &now.hour().to_string())
            .replace("mm", &now.minute().to_string())
            .replace("ss", &now.second().to_string());
        let stream = stream.to_lowercase();
        dated
            .replace("{stream}", &stream)
            .replace("{event}", &stream)
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn test_render_date_tokens_unpadded() {
        let template = IndexNameTemplate::new("tj-{stream}-yyyy.MM.dd-hh.mm.ss");
        assert_eq!(template.render("rphost", &at()), "tj-rphost-2024.3.7-9.5.2");
    }

    #[test]
    fn test_event_alias_and_lowercase() {
        let template = IndexNameTemplate::new("TJ-{event}-yyyy");
        assert_eq!(template.render("DBMSSQL", &at()), "tj-dbmssql-2024");
    }

    #[test]
    fn test_stream_name_not_touched_by_date_tokens() {
        let template = IndexNameTemplate::new("{stream}");
        assert_eq!(template.render("summss", &at()), "summss");
    }
}
