use super::models::ClientClass;
use crate::config::StatsConfig;

/// User-Agent classifier driven by configured marker lists.
#[derive(Debug, Clone)]
pub struct ClientClassifier {
    bot: Vec<String>,
    mobile: Vec<String>,
    desktop: Vec<String>,
}

impl ClientClassifier {
    pub fn new(config: &StatsConfig) -> Self {
        let lower = |markers: &[String]| {
            markers
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect()
        };
        Self {
            bot: lower(&config.bot_markers),
            mobile: lower(&config.mobile_markers),
            desktop: lower(&config.desktop_markers),
        }
    }

    pub fn classify(&self, user_agent: Option<&str>) -> ClientClass {
        let ua = match user_agent.map(str::trim) {
            Some(ua) if !ua.is_empty() => ua.to_ascii_lowercase(),
            _ => return ClientClass::Unknown,
        };
        let matches = |markers: &[String]| markers.iter().any(|m| ua.contains(m.as_str()));

        // Android UAs also say "Linux", so mobile is checked before desktop
        if matches(&self.bot) {
            ClientClass::Bot
        } else if matches(&self.mobile) {
            ClientClass::Mobile
        } else if matches(&self.desktop) {
            ClientClass::Desktop
        } else {
            ClientClass::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers() {
        let classifier = ClientClassifier::new(&StatsConfig::default());
        assert_eq!(
            classifier.classify(Some("Mozilla/5.0 (compatible; Googlebot/2.1)")),
            ClientClass::Bot
        );
        assert_eq!(
            classifier.classify(Some(
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36"
            )),
            ClientClass::Mobile
        );
        assert_eq!(
            classifier.classify(Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Firefox/128.0")),
            ClientClass::Desktop
        );
        assert_eq!(classifier.classify(Some("curl/8.5.0")), ClientClass::Bot);
        assert_eq!(classifier.classify(Some("SomethingElse/1.0")), ClientClass::Unknown);
        assert_eq!(classifier.classify(Some("  ")), ClientClass::Unknown);
        assert_eq!(classifier.classify(None), ClientClass::Unknown);
    }

    #[test]
    fn test_custom_markers() {
        let config = StatsConfig {
            bot_markers: vec!["Probe".to_string()],
            mobile_markers: vec![],
            desktop_markers: vec![],
            ..Default::default()
        };
        let classifier = ClientClassifier::new(&config);
        assert_eq!(classifier.classify(Some("uptime-probe/2")), ClientClass::Bot);
        assert_eq!(classifier.classify(Some("Googlebot")), ClientClass::Unknown);
    }
}
