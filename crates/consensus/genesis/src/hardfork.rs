//! Hardfork activation times.

use core::fmt::Display;

/// Hardfork activation timestamps for the L2 chain.
///
/// A `None` timestamp means the fork is not scheduled. Later forks imply
/// earlier ones, see [`crate::RollupConfig`].
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct HardForkConfig {
    /// `regolith_time` sets the activation time of the Regolith network-upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub regolith_time: Option<u64>,
    /// `canyon_time` sets the activation time of the Canyon network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub canyon_time: Option<u64>,
    /// `delta_time` sets the activation time of the Delta network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub delta_time: Option<u64>,
    /// `ecotone_time` sets the activation time of the Ecotone network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub ecotone_time: Option<u64>,
    /// `fjord_time` sets the activation time of the Fjord network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub fjord_time: Option<u64>,
    /// `granite_time` sets the activation time for the Granite network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub granite_time: Option<u64>,
    /// `holocene_time` sets the activation time for the Holocene network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub holocene_time: Option<u64>,
    /// `isthmus_time` sets the activation time for the Isthmus network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub isthmus_time: Option<u64>,
    /// `jovian_time` sets the activation time for the Jovian network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub jovian_time: Option<u64>,
    /// `interop_time` sets the activation time for the Interop network upgrade.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub interop_time: Option<u64>,
}

impl Display for HardForkConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fn fmt_time(t: Option<u64>) -> String {
            t.map(|t| t.to_string()).unwrap_or_else(|| "Not Scheduled".to_string())
        }

        writeln!(f, "🍴 Scheduled Hardforks:")?;
        for (name, time) in self.iter() {
            writeln!(f, "  -> {name}: {}", fmt_time(time))?;
        }
        Ok(())
    }
}

impl HardForkConfig {
    /// Returns an iterator over the hardforks and their activation times, in activation order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<u64>)> {
        [
            ("Regolith", self.regolith_time),
            ("Canyon", self.canyon_time),
            ("Delta", self.delta_time),
            ("Ecotone", self.ecotone_time),
            ("Fjord", self.fjord_time),
            ("Granite", self.granite_time),
            ("Holocene", self.holocene_time),
            ("Isthmus", self.isthmus_time),
            ("Jovian", self.jovian_time),
            ("Interop", self.interop_time),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "serde")]
    fn test_hardforks_deserialize_json() {
        let raw = r#"{
            "regolith_time": 0,
            "canyon_time": 1,
            "holocene_time": 7,
            "interop_time": 10
        }"#;
        let hardforks: HardForkConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(
            hardforks,
            HardForkConfig {
                regolith_time: Some(0),
                canyon_time: Some(1),
                holocene_time: Some(7),
                interop_time: Some(10),
                ..Default::default()
            }
        );
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_hardforks_deserialize_rejects_unknown_fields() {
        let raw = r#"{ "regolith_time": 0, "shanghai_time": 1 }"#;
        assert!(serde_json::from_str::<HardForkConfig>(raw).is_err());
    }

    #[test]
    fn test_hardforks_display_lists_unscheduled() {
        let hardforks = HardForkConfig { regolith_time: Some(0), ..Default::default() };
        let rendered = hardforks.to_string();
        assert!(rendered.contains("-> Regolith: 0"));
        assert!(rendered.contains("-> Interop: Not Scheduled"));
    }
}
