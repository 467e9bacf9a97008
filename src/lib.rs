//! ruler: match JSON events against large sets of rules
//!
//! Rules are JSON documents describing the field values an event must carry.
//! They are compiled into one shared automaton, so the cost of matching an
//! event depends on the event and on the kinds of patterns in use, not on how
//! many rules are stored.
//!
//! ```
//! use ruler::Machine;
//!
//! let machine = Machine::<String>::new();
//! machine
//!     .add_json_rule(
//!         "big-order".to_string(),
//!         r#"{"detail": {"type": ["order"], "total": [{"numeric": [">=", 100]}]}}"#,
//!     )
//!     .unwrap();
//!
//! let event = r#"{"detail": {"type": "order", "total": 250.5}}"#;
//! assert_eq!(
//!     machine.rules_for_json_event(event).unwrap(),
//!     vec!["big-order".to_string()]
//! );
//! ```

mod array_membership;
mod automaton;
mod cidr;
mod error;
mod event;
mod finder;
mod input;
mod machine;
mod numbits;
mod pattern;
mod rule_compiler;
mod sub_rule;

pub use array_membership::ArrayMembership;
pub use automaton::MachineComplexityEvaluator;
pub use cidr::ip_to_comparable;
pub use error::{Result, RulerError};
pub use event::{Event, Field};
pub use machine::{Machine, MachineBuilder, MachineConfig, MAX_RULE_FIELDS};
pub use numbits::comparable_number;
pub use pattern::{MatchType, Pattern, Range};
pub use rule_compiler::compile;
pub use sub_rule::{RuleName, SubRule, SubRuleContext};

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(machine: &Machine, event: &str) -> Vec<String> {
        let mut found = machine.rules_for_json_event(event).unwrap();
        found.sort();
        found
    }

    #[test]
    fn test_exact_match() {
        let machine = Machine::new();
        machine
            .add_json_rule("p1".to_string(), r#"{"status": ["active"]}"#)
            .unwrap();

        assert_eq!(matches(&machine, r#"{"status": "active"}"#), vec!["p1"]);
        assert!(matches(&machine, r#"{"status": "inactive"}"#).is_empty());
    }

    #[test]
    fn test_string_and_number_are_distinct() {
        let machine = Machine::new();
        machine
            .add_json_rule("text".to_string(), r#"{"x": ["35"]}"#)
            .unwrap();
        machine
            .add_json_rule("number".to_string(), r#"{"x": [35]}"#)
            .unwrap();

        assert_eq!(matches(&machine, r#"{"x": "35"}"#), vec!["text"]);
        assert_eq!(matches(&machine, r#"{"x": 35}"#), vec!["number"]);
    }

    #[test]
    fn test_numeric_variants() {
        let machine = Machine::new();
        machine.add_json_rule("p1".to_string(), r#"{"x": [35]}"#).unwrap();

        assert_eq!(matches(&machine, r#"{"x": 35}"#), vec!["p1"]);
        assert_eq!(matches(&machine, r#"{"x": 35.0}"#), vec!["p1"]);
        assert_eq!(matches(&machine, r#"{"x": 3.5e1}"#), vec!["p1"]);
        assert!(matches(&machine, r#"{"x": 35.5}"#).is_empty());
    }

    #[test]
    fn test_boolean_and_null() {
        let machine = Machine::new();
        machine
            .add_json_rule("on".to_string(), r#"{"enabled": [true]}"#)
            .unwrap();
        machine
            .add_json_rule("unset".to_string(), r#"{"owner": [null]}"#)
            .unwrap();

        assert_eq!(matches(&machine, r#"{"enabled": true}"#), vec!["on"]);
        assert!(matches(&machine, r#"{"enabled": "true"}"#).is_empty());
        assert_eq!(matches(&machine, r#"{"owner": null}"#), vec!["unset"]);
    }

    #[test]
    fn test_nested_fields() {
        let machine = Machine::new();
        machine
            .add_json_rule("admin".to_string(), r#"{"user": {"role": ["admin"]}}"#)
            .unwrap();

        let event = r#"{"user": {"role": "admin", "name": "alice", "id": 123}, "ts": 1}"#;
        assert_eq!(matches(&machine, event), vec!["admin"]);
    }

    #[test]
    fn test_event_arrays() {
        let machine = Machine::new();
        machine
            .add_json_rule("tagged".to_string(), r#"{"tags": ["urgent"]}"#)
            .unwrap();

        assert_eq!(
            matches(&machine, r#"{"tags": ["low", "urgent", "billing"]}"#),
            vec!["tagged"]
        );
        assert!(matches(&machine, r#"{"tags": []}"#).is_empty());
    }

    #[test]
    fn test_string_matchers() {
        let machine = Machine::new();
        machine
            .add_json_rule("prefix".to_string(), r#"{"s": [{"prefix": "ab"}]}"#)
            .unwrap();
        machine
            .add_json_rule("suffix".to_string(), r#"{"s": [{"suffix": ".png"}]}"#)
            .unwrap();
        machine
            .add_json_rule("ci".to_string(), r#"{"s": [{"equals-ignore-case": "ABC.PNG"}]}"#)
            .unwrap();
        machine
            .add_json_rule("wild".to_string(), r#"{"s": [{"wildcard": "a*.p*g"}]}"#)
            .unwrap();

        assert_eq!(
            matches(&machine, r#"{"s": "abc.png"}"#),
            vec!["ci", "prefix", "suffix", "wild"]
        );
        assert_eq!(matches(&machine, r#"{"s": "x.png"}"#), vec!["suffix"]);
        assert_eq!(matches(&machine, r#"{"s": "abz"}"#), vec!["prefix"]);
    }

    #[test]
    fn test_anything_but() {
        let machine = Machine::new();
        machine
            .add_json_rule(
                "not-test".to_string(),
                r#"{"env": [{"anything-but": ["test", "dev"]}]}"#,
            )
            .unwrap();
        machine
            .add_json_rule(
                "not-zero".to_string(),
                r#"{"n": [{"anything-but": [0]}]}"#,
            )
            .unwrap();

        assert_eq!(matches(&machine, r#"{"env": "prod"}"#), vec!["not-test"]);
        assert!(matches(&machine, r#"{"env": "dev"}"#).is_empty());
        assert_eq!(matches(&machine, r#"{"n": 3}"#), vec!["not-zero"]);
        assert!(matches(&machine, r#"{"n": 0}"#).is_empty());
        // Nothing to compare against when the field is missing.
        assert!(matches(&machine, r#"{"other": 1}"#).is_empty());
    }

    #[test]
    fn test_anything_but_prefix() {
        let machine = Machine::new();
        machine
            .add_json_rule(
                "external".to_string(),
                r#"{"host": [{"anything-but": {"prefix": "int-"}}]}"#,
            )
            .unwrap();

        assert_eq!(matches(&machine, r#"{"host": "web-1"}"#), vec!["external"]);
        assert!(matches(&machine, r#"{"host": "int-db"}"#).is_empty());
    }

    #[test]
    fn test_exists() {
        let machine = Machine::new();
        machine
            .add_json_rule("has-id".to_string(), r#"{"id": [{"exists": true}]}"#)
            .unwrap();
        machine
            .add_json_rule("no-id".to_string(), r#"{"id": [{"exists": false}]}"#)
            .unwrap();

        assert_eq!(matches(&machine, r#"{"id": "x"}"#), vec!["has-id"]);
        assert_eq!(matches(&machine, r#"{"name": "x"}"#), vec!["no-id"]);
    }

    #[test]
    fn test_cidr() {
        let machine = Machine::new();
        machine
            .add_json_rule("lan".to_string(), r#"{"ip": [{"cidr": "10.0.0.0/24"}]}"#)
            .unwrap();

        assert_eq!(matches(&machine, r#"{"ip": "10.0.0.77"}"#), vec!["lan"]);
        assert!(matches(&machine, r#"{"ip": "10.0.1.1"}"#).is_empty());
        assert!(matches(&machine, r#"{"ip": "not an address"}"#).is_empty());
    }

    #[test]
    fn test_or_reports_rule_once() {
        let machine = Machine::new();
        machine
            .add_json_rule(
                "either".to_string(),
                r#"{"$or": [{"a": ["1"]}, {"b": ["2"]}]}"#,
            )
            .unwrap();

        assert_eq!(matches(&machine, r#"{"a": "1", "b": "2"}"#), vec!["either"]);
        assert!(matches(&machine, r#"{"c": "3"}"#).is_empty());
    }

    #[test]
    fn test_delete_json_rule() {
        let machine = Machine::new();
        let rule = r#"{"a": [{"prefix": "x"}], "b": [1, 2]}"#;
        machine.add_json_rule("r".to_string(), rule).unwrap();
        assert_eq!(matches(&machine, r#"{"a": "xy", "b": 2}"#), vec!["r"]);

        machine.delete_json_rule(&"r".to_string(), rule).unwrap();
        assert!(matches(&machine, r#"{"a": "xy", "b": 2}"#).is_empty());
        assert!(machine.is_empty());
    }

    #[test]
    fn test_custom_rule_names() {
        let machine: Machine<u32> = Machine::new();
        machine.add_json_rule(7, r#"{"k": ["v"]}"#).unwrap();
        assert_eq!(machine.rules_for_json_event(r#"{"k": "v"}"#).unwrap(), vec![7]);
    }

    #[test]
    fn test_invalid_input() {
        let machine: Machine = Machine::new();
        assert!(matches!(
            machine.add_json_rule("r".to_string(), r#"{"a": "not a list"}"#),
            Err(RulerError::InvalidRule(_))
        ));
        assert!(matches!(
            machine.add_json_rule("r".to_string(), "{"),
            Err(RulerError::InvalidJson(_))
        ));
        assert!(matches!(
            machine.rules_for_json_event("[]"),
            Err(RulerError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_unused_fields_are_ignored() {
        let machine = Machine::new();
        machine.add_json_rule("r".to_string(), r#"{"a": ["x"]}"#).unwrap();
        assert!(machine.is_field_used("a"));
        assert!(!machine.is_field_used("b"));

        let event = r#"{"b": {"deep": [1, 2, {"x": "y"}]}, "a": "x"}"#;
        assert_eq!(matches(&machine, event), vec!["r"]);
    }

    #[test]
    fn test_config_from_json() {
        let config: MachineConfig =
            serde_json::from_str(r#"{"additional_name_state_reuse": true}"#).unwrap();
        assert!(config.additional_name_state_reuse);
        let config: MachineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MachineConfig::default());

        let machine: Machine = Machine::with_config(config);
        assert!(machine.is_empty());
    }
}
