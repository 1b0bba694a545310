//! ASSERT steps: a closed set of counters compared against an integer.
//!
//! Grammar: `<field> <op> <integer>` where field is one of `step`,
//! `range[i].sent`, `range[i].received` or `entry[i.j].fired` (range `i`,
//! entry `j`, both zero-based in file order), and op is one of
//! `==`, `!=`, `<`, `<=`, `>`, `>=`.

use crate::errors::ScenarioError;
use crate::scenario::Scenario;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertField {
    Step,
    RangeSent(usize),
    RangeReceived(usize),
    EntryFired(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Comparison::Eq),
            "!=" => Ok(Comparison::Ne),
            "<" => Ok(Comparison::Lt),
            "<=" => Ok(Comparison::Le),
            ">" => Ok(Comparison::Gt),
            ">=" => Ok(Comparison::Ge),
            other => Err(format!("unknown comparison operator '{}'", other)),
        }
    }
}

impl FromStr for AssertField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "step" {
            return Ok(AssertField::Step);
        }
        let bad = || format!("unknown assertion field '{}'", s);
        let (head, counter) = s.split_once("].").ok_or_else(bad)?;
        let (kind, index) = head.split_once('[').ok_or_else(bad)?;
        match (kind, counter) {
            ("range", "sent") => Ok(AssertField::RangeSent(index.parse().map_err(|_| bad())?)),
            ("range", "received") => {
                Ok(AssertField::RangeReceived(index.parse().map_err(|_| bad())?))
            }
            ("entry", "fired") => {
                let (r, e) = index.split_once('.').ok_or_else(bad)?;
                Ok(AssertField::EntryFired(
                    r.parse().map_err(|_| bad())?,
                    e.parse().map_err(|_| bad())?,
                ))
            }
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for AssertField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertField::Step => write!(f, "step"),
            AssertField::RangeSent(i) => write!(f, "range[{}].sent", i),
            AssertField::RangeReceived(i) => write!(f, "range[{}].received", i),
            AssertField::EntryFired(r, e) => write!(f, "entry[{}.{}].fired", r, e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assertion {
    pub field: AssertField,
    pub op: Comparison,
    pub value: i64,
}

impl Assertion {
    pub fn parse_tokens(tokens: &[String]) -> Result<Self, String> {
        let [field, op, value] = tokens else {
            return Err(format!(
                "ASSERT expects '<field> <op> <value>', got '{}'",
                tokens.join(" ")
            ));
        };
        Ok(Self {
            field: field.parse()?,
            op: op.parse()?,
            value: value
                .parse()
                .map_err(|_| format!("ASSERT value '{}' is not an integer", value))?,
        })
    }

    fn resolve(&self, scenario: &Scenario) -> Result<i64, ScenarioError> {
        let missing = || ScenarioError::InvalidStep(format!("{} does not exist", self.field));
        let value = match self.field {
            AssertField::Step => scenario.current_step_id(),
            AssertField::RangeSent(i) => scenario.ranges.get(i).ok_or_else(missing)?.sent() as i64,
            AssertField::RangeReceived(i) => {
                scenario.ranges.get(i).ok_or_else(missing)?.received() as i64
            }
            AssertField::EntryFired(r, e) => scenario
                .ranges
                .get(r)
                .and_then(|range| range.entries.get(e))
                .ok_or_else(missing)?
                .fired() as i64,
        };
        Ok(value)
    }

    pub fn evaluate(&self, scenario: &Scenario) -> Result<(), ScenarioError> {
        let actual = self.resolve(scenario)?;
        if self.op.holds(actual, self.value) {
            Ok(())
        } else {
            Err(ScenarioError::AssertionFailed {
                expression: self.to_string(),
                actual,
            })
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op.as_str(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_fields() {
        let a = Assertion::parse_tokens(&tokens("range[2].sent >= 3")).unwrap();
        assert_eq!(a.field, AssertField::RangeSent(2));
        assert_eq!(a.op, Comparison::Ge);
        assert_eq!(a.value, 3);

        let a = Assertion::parse_tokens(&tokens("entry[0.1].fired == 0")).unwrap();
        assert_eq!(a.field, AssertField::EntryFired(0, 1));
        assert_eq!(a.to_string(), "entry[0.1].fired == 0");
    }

    #[test]
    fn test_rejects_free_form_expressions() {
        assert!(Assertion::parse_tokens(&tokens("__import__('os') == 1")).is_err());
        assert!(Assertion::parse_tokens(&tokens("range[0].sent")).is_err());
        assert!(Assertion::parse_tokens(&tokens("range[x].sent == 1")).is_err());
        assert!(Assertion::parse_tokens(&tokens("step =~ 1")).is_err());
    }
}
