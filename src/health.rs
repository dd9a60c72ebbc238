use serde::Serialize;

use crate::location::Provider;

/// Non-blocking condition the UI should surface while recording continues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Advisory {
    /// Location permission revoked; only the last known fix is available
    PermissionMissing,
    /// A provider the session relies on is switched off
    ProviderDisabled(Provider),
    /// No subscribed provider has delivered a fix recently
    NoRecentFix,
}

/// Availability of one location provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub enabled: bool,
    pub subscribed: bool,
    /// Monotonic time of the last delivered fix
    pub last_fix_nanos: Option<i64>,
    /// Monotonic time the current subscription began
    pub subscribed_nanos: Option<i64>,
}

impl ProviderStatus {
    fn new(provider: Provider) -> Self {
        ProviderStatus {
            provider,
            enabled: false,
            subscribed: false,
            last_fix_nanos: None,
            subscribed_nanos: None,
        }
    }

    /// Start of the current quiet period: the later of the last fix and
    /// the subscription
    fn quiet_since(&self) -> Option<i64> {
        match (self.last_fix_nanos, self.subscribed_nanos) {
            (Some(fix), Some(subscribed)) => Some(fix.max(subscribed)),
            (fix, subscribed) => fix.or(subscribed),
        }
    }

    /// Silent when subscribed but quiet for longer than `threshold_nanos`
    pub fn is_silent(&self, now_nanos: i64, threshold_nanos: i64) -> bool {
        if !self.subscribed {
            return false;
        }
        self.quiet_since()
            .map_or(false, |since| now_nanos - since > threshold_nanos)
    }
}

/// Tracks provider availability and permission for advisories
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub gps: ProviderStatus,
    pub network: ProviderStatus,
    pub permission_granted: bool,
    silence_threshold_nanos: i64,
}

impl ProviderHealth {
    pub fn new(silence_threshold_nanos: i64) -> Self {
        ProviderHealth {
            gps: ProviderStatus::new(Provider::Gps),
            network: ProviderStatus::new(Provider::Network),
            permission_granted: true,
            silence_threshold_nanos,
        }
    }

    pub fn status(&self, provider: Provider) -> &ProviderStatus {
        match provider {
            Provider::Gps => &self.gps,
            Provider::Network => &self.network,
        }
    }

    pub fn status_mut(&mut self, provider: Provider) -> &mut ProviderStatus {
        match provider {
            Provider::Gps => &mut self.gps,
            Provider::Network => &mut self.network,
        }
    }

    pub fn set_enabled(&mut self, provider: Provider, enabled: bool) {
        self.status_mut(provider).enabled = enabled;
    }

    pub fn set_subscribed(&mut self, provider: Provider, subscribed: bool, now_nanos: i64) {
        let status = self.status_mut(provider);
        status.subscribed = subscribed;
        status.subscribed_nanos = if subscribed { Some(now_nanos) } else { None };
    }

    pub fn set_silence_threshold(&mut self, threshold_nanos: i64) {
        self.silence_threshold_nanos = threshold_nanos;
    }

    pub fn record_fix(&mut self, provider: Provider, now_nanos: i64) {
        self.status_mut(provider).last_fix_nanos = Some(now_nanos);
    }

    /// Current advisories. The network provider only matters outside GPS-only mode.
    pub fn advisories(&self, now_nanos: i64, gps_only: bool) -> Vec<Advisory> {
        let mut advisories = Vec::new();
        if !self.permission_granted {
            advisories.push(Advisory::PermissionMissing);
        }
        if !self.gps.enabled {
            advisories.push(Advisory::ProviderDisabled(Provider::Gps));
        }
        if !gps_only && !self.network.enabled {
            advisories.push(Advisory::ProviderDisabled(Provider::Network));
        }

        let relied_upon: Vec<&ProviderStatus> = [&self.gps, &self.network]
            .into_iter()
            .filter(|s| s.subscribed)
            .collect();
        if !relied_upon.is_empty()
            && relied_upon
                .iter()
                .all(|s| s.is_silent(now_nanos, self.silence_threshold_nanos))
        {
            advisories.push(Advisory::NoRecentFix);
        }
        advisories
    }

    /// One-line summary for logs
    pub fn format_status(&self, now_nanos: i64) -> String {
        let describe = |status: &ProviderStatus| {
            if !status.enabled {
                "disabled".to_string()
            } else if !status.subscribed {
                "idle".to_string()
            } else if status.is_silent(now_nanos, self.silence_threshold_nanos) {
                let silent_for = status
                    .quiet_since()
                    .map(|since| (now_nanos - since) as f64 / 1e9)
                    .unwrap_or(0.0);
                format!("silent {:.1}s", silent_for)
            } else {
                "ok".to_string()
            }
        };
        format!(
            "Providers: GPS {} | Network {} | permission {}",
            describe(&self.gps),
            describe(&self.network),
            if self.permission_granted { "granted" } else { "missing" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: i64 = 1_000_000_000;

    #[test]
    fn test_disabled_provider_advisories() {
        let mut health = ProviderHealth::new(60 * SECOND);
        health.set_enabled(Provider::Gps, true);
        assert_eq!(
            health.advisories(0, false),
            vec![Advisory::ProviderDisabled(Provider::Network)]
        );
        assert!(health.advisories(0, true).is_empty());
    }

    #[test]
    fn test_permission_advisory() {
        let mut health = ProviderHealth::new(60 * SECOND);
        health.set_enabled(Provider::Gps, true);
        health.set_enabled(Provider::Network, true);
        health.permission_granted = false;
        assert_eq!(health.advisories(0, false), vec![Advisory::PermissionMissing]);
    }

    #[test]
    fn test_silence_detection() {
        let mut health = ProviderHealth::new(30 * SECOND);
        health.set_enabled(Provider::Gps, true);
        health.set_enabled(Provider::Network, true);
        health.set_subscribed(Provider::Gps, true, 0);
        health.record_fix(Provider::Gps, 0);

        assert!(health.advisories(10 * SECOND, false).is_empty());
        assert_eq!(health.advisories(31 * SECOND, false), vec![Advisory::NoRecentFix]);
        assert!(health.format_status(31 * SECOND).contains("silent 31.0s"));

        health.record_fix(Provider::Gps, 31 * SECOND);
        assert!(health.advisories(32 * SECOND, false).is_empty());
        assert!(health.format_status(32 * SECOND).contains("GPS ok"));
    }

    #[test]
    fn test_subscribed_provider_that_never_delivers_is_silent() {
        let mut health = ProviderHealth::new(30 * SECOND);
        health.set_enabled(Provider::Gps, true);
        health.set_subscribed(Provider::Gps, true, 100 * SECOND);

        assert!(health.advisories(120 * SECOND, true).is_empty());
        assert_eq!(health.advisories(131 * SECOND, true), vec![Advisory::NoRecentFix]);
        assert!(health.format_status(131 * SECOND).contains("silent 31.0s"));

        // a fix from an earlier subscription does not count
        health.record_fix(Provider::Gps, 140 * SECOND);
        health.set_subscribed(Provider::Gps, false, 150 * SECOND);
        health.set_subscribed(Provider::Gps, true, 200 * SECOND);
        assert!(health.advisories(220 * SECOND, true).is_empty());
        assert_eq!(health.advisories(231 * SECOND, true), vec![Advisory::NoRecentFix]);
    }
}
