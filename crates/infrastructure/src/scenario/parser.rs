use super::lexer::{split_lines, Line};
use super::record::{parse_question, parse_record};
use ferrous_replay_domain::dns_text::{opcode_from_text, rcode_from_text, unhex};
use ferrous_replay_domain::{
    wire, AdjustField, Assertion, EdnsTemplate, Entry, MatchCriterion, Range, RawReply, Scenario,
    ScenarioError, Step, StepType, TsigKey,
};
use hickory_proto::op::{MessageType, Query};
use hickory_proto::rr::rdata::opt::EdnsCode;
use hickory_proto::rr::{Record, RecordType};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

/// Builds a [`Scenario`] from scenario text.
///
/// Carries its own step counter: a `STEP` without an id gets the previous
/// id plus one.
pub struct ScenarioParser {
    file: String,
    lines: Vec<Line>,
    pos: usize,
    next_step_id: i64,
}

pub fn parse_file(path: &Path) -> Result<Scenario, ScenarioError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ScenarioError::Io(format!("{}: {}", path.display(), e)))?;
    ScenarioParser::new(path.display().to_string(), &text).parse()
}

impl ScenarioParser {
    pub fn new(file: impl Into<String>, text: &str) -> Self {
        Self {
            file: file.into(),
            lines: split_lines(text),
            pos: 0,
            next_step_id: 0,
        }
    }

    pub fn parse(mut self) -> Result<Scenario, ScenarioError> {
        let config = self.parse_header();
        let (name, ranges, steps) = self.parse_body()?;
        debug!(
            file = %self.file,
            ranges = ranges.len(),
            steps = steps.len(),
            "Scenario parsed"
        );
        Ok(Scenario::new(name, self.file, config, ranges, steps))
    }

    fn error(&self, line: usize, message: impl Into<String>) -> ScenarioError {
        ScenarioError::Parse {
            file: self.file.clone(),
            line,
            message: message.into(),
        }
    }

    fn advance(&mut self) -> Option<Line> {
        let line = self.lines.get(self.pos).cloned();
        self.pos += 1;
        line
    }

    /// Next line carrying tokens, skipping blank and comment-only lines.
    fn advance_content(&mut self) -> Option<Line> {
        while let Some(line) = self.advance() {
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn peek_content(&self) -> Option<&Line> {
        self.lines[self.pos.min(self.lines.len())..]
            .iter()
            .find(|l| !l.is_empty())
    }

    fn last_line(&self) -> usize {
        self.lines.len()
    }

    /// `key: value` pairs up to `CONFIG_END`. A scenario may also start
    /// directly with `SCENARIO_BEGIN`.
    fn parse_header(&mut self) -> Vec<(String, String)> {
        let mut config = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            match line.keyword() {
                None => {}
                Some("CONFIG_END") => {
                    self.pos += 1;
                    break;
                }
                Some("SCENARIO_BEGIN") => break,
                Some(_) => {
                    let (key, value) = match line.text.split_once(':') {
                        Some((key, value)) => (key.trim(), value.trim()),
                        None => (line.text.as_str(), ""),
                    };
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .unwrap_or(value);
                    config.push((key.to_string(), value.to_string()));
                }
            }
            self.pos += 1;
        }
        config
    }

    fn parse_body(&mut self) -> Result<(String, Vec<Range>, Vec<Step>), ScenarioError> {
        let mut name = None;
        let mut ranges = Vec::new();
        let mut steps = Vec::new();

        while let Some(line) = self.advance_content() {
            match line.keyword().unwrap_or_default() {
                "SCENARIO_BEGIN" => name = Some(line.args().join(" ")),
                "SCENARIO_END" => {
                    let name = name
                        .ok_or_else(|| self.error(line.number, "SCENARIO_END without SCENARIO_BEGIN"))?;
                    return Ok((name, ranges, steps));
                }
                _ if name.is_none() => {
                    return Err(self.error(line.number, "expected SCENARIO_BEGIN"));
                }
                "RANGE_BEGIN" => ranges.push(self.parse_range(&line)?),
                "STEP" => steps.push(self.parse_step(&line)?),
                other => {
                    return Err(self.error(line.number, format!("unexpected '{}'", other)));
                }
            }
        }
        Err(self.error(self.last_line(), "missing SCENARIO_END"))
    }

    /// `RANGE_BEGIN <a> <b> [addr] [key=value]...`
    fn parse_range(&mut self, begin: &Line) -> Result<Range, ScenarioError> {
        let args = begin.args();
        let bound = |i: usize| -> Result<i64, ScenarioError> {
            args.get(i)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| self.error(begin.number, "RANGE_BEGIN needs two step ids"))
        };
        let (first, last) = (bound(0)?, bound(1)?);
        if first > last {
            return Err(self.error(
                begin.number,
                format!("empty range {}..{}", first, last),
            ));
        }

        let mut range = Range::new(first, last, begin.number);
        for arg in &args[2..] {
            if let Some((key, value)) = arg.split_once('=') {
                range.args.insert(key.to_ascii_uppercase(), value.to_string());
            } else {
                let addr = arg.parse::<IpAddr>().map_err(|_| {
                    self.error(begin.number, format!("invalid range address '{}'", arg))
                })?;
                range.addresses.insert(addr);
            }
        }

        while let Some(line) = self.advance_content() {
            match line.keyword().unwrap_or_default() {
                "RANGE_END" => return Ok(range),
                "ADDRESS" => {
                    let addr = line
                        .args()
                        .first()
                        .and_then(|a| a.parse::<IpAddr>().ok())
                        .ok_or_else(|| self.error(line.number, "ADDRESS needs an IP address"))?;
                    range.addresses.insert(addr);
                }
                "ENTRY_BEGIN" => range.entries.push(self.parse_entry(line.number)?),
                other => {
                    return Err(self.error(
                        line.number,
                        format!("unexpected '{}' inside RANGE", other),
                    ));
                }
            }
        }
        Err(self.error(begin.number, "RANGE_BEGIN without RANGE_END"))
    }

    /// `STEP [id] <TYPE> [args]` plus its entry block or REPLAY question list.
    fn parse_step(&mut self, line: &Line) -> Result<Step, ScenarioError> {
        let args = line.args();
        let (id, rest) = match args.first().and_then(|a| a.parse::<i64>().ok()) {
            Some(id) => (id, &args[1..]),
            None => (self.next_step_id, args),
        };
        let (type_token, rest) = rest
            .split_first()
            .ok_or_else(|| self.error(line.number, "STEP without a type"))?;
        let step_type: StepType = type_token.parse().map_err(|e: ScenarioError| {
            self.error(line.number, e.to_string())
        })?;
        self.next_step_id = id + 1;

        let mut step = Step::new(id, step_type, Vec::new(), line.number);
        for arg in rest {
            match arg.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case("REPEAT") => {
                    step.repeat_count = value
                        .parse()
                        .map_err(|_| self.error(line.number, format!("invalid REPEAT '{}'", value)))?;
                }
                Some((key, value)) if key.eq_ignore_ascii_case("PAUSE") => {
                    step.pause = value
                        .parse::<f64>()
                        .ok()
                        .and_then(|s| Duration::try_from_secs_f64(s).ok())
                        .ok_or_else(|| self.error(line.number, format!("invalid PAUSE '{}'", value)))?;
                }
                Some((key, value)) if key.eq_ignore_ascii_case("NEXT") => {
                    step.next_on_failure = Some(
                        value
                            .parse()
                            .map_err(|_| self.error(line.number, format!("invalid NEXT '{}'", value)))?,
                    );
                }
                _ => step.args.push(arg.clone()),
            }
        }

        match step_type {
            StepType::Assert => {
                let assertion = Assertion::parse_tokens(&step.args)
                    .map_err(|e| self.error(line.number, e))?;
                step.assertion = Some(assertion);
            }
            StepType::Replay => step.queries = self.parse_replay_queries()?,
            _ => {}
        }

        if self.peek_content().and_then(Line::keyword) == Some("ENTRY_BEGIN") {
            let begin = self.advance_content().map(|l| l.number).unwrap_or(line.number);
            step.data = Some(self.parse_entry(begin)?);
        } else if step_type.has_data() {
            return Err(self.error(
                line.number,
                format!("{} step {} needs an ENTRY", step_type, id),
            ));
        }

        Ok(step)
    }

    /// Question lines following a REPLAY step, up to the first blank line.
    fn parse_replay_queries(&mut self) -> Result<Vec<Query>, ScenarioError> {
        let mut queries = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.blank {
                break;
            }
            if matches!(
                line.keyword(),
                Some("STEP" | "RANGE_BEGIN" | "SCENARIO_END" | "ENTRY_BEGIN")
            ) {
                break;
            }
            if !line.is_empty() {
                let query = parse_question(&line.tokens, &hickory_proto::rr::Name::root())
                    .map_err(|e| self.error(line.number, e))?;
                queries.push(query);
            }
            self.pos += 1;
        }
        Ok(queries)
    }

    fn parse_entry(&mut self, begin: usize) -> Result<Entry, ScenarioError> {
        let mut entry = Entry::new(begin);
        let mut section: Option<Section> = None;
        let mut raw_hex: Option<String> = None;
        let mut questions: Vec<Query> = Vec::new();
        let mut records: [Vec<Record>; 3] = Default::default();

        while let Some(line) = self.advance_content() {
            let keyword = line.keyword().unwrap_or_default();
            if keyword == "ENTRY_END" {
                return self.finish_entry(entry, raw_hex, questions, records, line.number);
            }
            if let Some(hex) = raw_hex.as_mut() {
                hex.push_str(&line.text);
                continue;
            }

            let args = line.args();
            match keyword {
                "MATCH" => {
                    entry.match_fields = MatchCriterion::parse_list(args.iter().map(String::as_str))
                        .map_err(|e| self.error(line.number, e))?;
                }
                "ADJUST" => {
                    entry.adjust_fields = args
                        .iter()
                        .map(|a| a.parse::<AdjustField>())
                        .collect::<Result<_, _>>()
                        .map_err(|e| self.error(line.number, e))?;
                }
                "REPLY" | "FLAGS" => self.apply_flags(&mut entry, &line)?,
                "EDNS" => self.apply_edns(&mut entry, &line)?,
                "SECTION" => {
                    section = Some(match args.first().map(|s| s.to_ascii_uppercase()).as_deref() {
                        Some("QUESTION") => Section::Question,
                        Some("ANSWER") => Section::Answer,
                        Some("AUTHORITY") => Section::Authority,
                        Some("ADDITIONAL") => Section::Additional,
                        _ => {
                            return Err(self.error(
                                line.number,
                                format!("unknown section '{}'", args.join(" ")),
                            ))
                        }
                    });
                }
                "RAW" => raw_hex = Some(String::new()),
                "TSIG" => {
                    let [name, secret] = args else {
                        return Err(self.error(line.number, "TSIG needs <name> <secret>"));
                    };
                    entry.tsig = Some(
                        TsigKey::from_text(name, secret).map_err(|e| self.error(line.number, e))?,
                    );
                }
                "MANDATORY" => entry.mandatory = true,
                _ => match section {
                    None => {
                        return Err(self.error(
                            line.number,
                            format!("'{}' outside of any SECTION", line.text),
                        ))
                    }
                    Some(Section::Question) => questions.push(
                        parse_question(&line.tokens, &entry.origin)
                            .map_err(|e| self.error(line.number, e))?,
                    ),
                    Some(other) => {
                        let record = parse_record(&line.tokens, &entry.origin)
                            .map_err(|e| self.error(line.number, e))?;
                        let index = match other {
                            Section::Answer => 0,
                            Section::Authority => 1,
                            _ => 2,
                        };
                        merge_record(&mut records[index], record);
                    }
                },
            }
        }
        Err(self.error(begin, "ENTRY_BEGIN without ENTRY_END"))
    }

    fn finish_entry(
        &self,
        mut entry: Entry,
        raw_hex: Option<String>,
        questions: Vec<Query>,
        records: [Vec<Record>; 3],
        end: usize,
    ) -> Result<Entry, ScenarioError> {
        if let Some(hex) = raw_hex {
            entry.raw = Some(if hex.is_empty() {
                RawReply::Silent
            } else {
                RawReply::Bytes(
                    unhex(&hex).ok_or_else(|| self.error(end, "RAW data is not valid hex"))?,
                )
            });
            return Ok(entry);
        }

        let [answers, authority, additional] = records;
        entry.message.add_queries(questions);
        entry.message.add_answers(answers);
        entry.message.add_name_servers(authority);
        entry.message.add_additionals(additional);
        entry.apply_edns();
        Ok(entry)
    }

    /// Header flags, rcode, opcode and the EDNS `DO` bit.
    fn apply_flags(&self, entry: &mut Entry, line: &Line) -> Result<(), ScenarioError> {
        for flag in line.args() {
            let message = &mut entry.message;
            match flag.to_ascii_uppercase().as_str() {
                "QR" => {
                    wire::set_message_type(message, MessageType::Response);
                }
                "AA" => {
                    message.set_authoritative(true);
                }
                "TC" => {
                    message.set_truncated(true);
                }
                "RD" => {
                    message.set_recursion_desired(true);
                }
                "RA" => {
                    message.set_recursion_available(true);
                }
                "AD" => {
                    message.set_authentic_data(true);
                }
                "CD" => {
                    message.set_checking_disabled(true);
                }
                "DO" => entry.edns.get_or_insert_with(EdnsTemplate::default).dnssec_ok = true,
                other => {
                    if let Some(rcode) = rcode_from_text(other) {
                        message.set_response_code(rcode);
                    } else if let Some(opcode) = opcode_from_text(other) {
                        message.set_op_code(opcode);
                    } else {
                        return Err(self.error(line.number, format!("unknown flag '{}'", flag)));
                    }
                }
            }
        }
        Ok(())
    }

    /// `EDNS [version] [payload] [DO] [NSID] [NSID=<ascii|0xhex>] [<code>=<0xhex>]`
    fn apply_edns(&self, entry: &mut Entry, line: &Line) -> Result<(), ScenarioError> {
        let template = entry.edns.get_or_insert_with(EdnsTemplate::default);
        let mut numbers = 0;
        for arg in line.args() {
            if let Ok(value) = arg.parse::<u16>() {
                match numbers {
                    0 => {
                        template.version = u8::try_from(value).map_err(|_| {
                            self.error(line.number, format!("invalid EDNS version '{}'", arg))
                        })?
                    }
                    1 => template.payload = value,
                    _ => return Err(self.error(line.number, format!("unexpected '{}'", arg))),
                }
                numbers += 1;
                continue;
            }
            if arg.eq_ignore_ascii_case("DO") {
                template.dnssec_ok = true;
                continue;
            }
            if arg.eq_ignore_ascii_case("NSID") {
                template.options.push((u16::from(EdnsCode::NSID), Vec::new()));
                continue;
            }
            let Some((key, value)) = arg.split_once('=') else {
                return Err(self.error(line.number, format!("unknown EDNS option '{}'", arg)));
            };
            let code = if key.eq_ignore_ascii_case("NSID") {
                u16::from(EdnsCode::NSID)
            } else {
                key.parse::<u16>().map_err(|_| {
                    self.error(line.number, format!("unknown EDNS option '{}'", key))
                })?
            };
            let data = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
                Some(hex) => unhex(hex).ok_or_else(|| {
                    self.error(line.number, format!("invalid hex option value '{}'", value))
                })?,
                None if code == u16::from(EdnsCode::NSID) => value.as_bytes().to_vec(),
                None => {
                    return Err(self.error(
                        line.number,
                        format!("EDNS option {} value must be 0x-prefixed hex", code),
                    ))
                }
            };
            template.options.push((code, data));
        }
        Ok(())
    }
}

/// Appends `record` after the last record of the same RR set; SOA records
/// never merge. Exact duplicates are dropped.
fn merge_record(section: &mut Vec<Record>, record: Record) {
    if section.contains(&record) {
        return;
    }
    let same_set = |r: &Record| {
        r.name() == record.name()
            && r.record_type() == record.record_type()
            && r.dns_class() == record.dns_class()
    };
    match section.iter().rposition(same_set) {
        Some(index) if record.record_type() != RecordType::SOA => {
            section.insert(index + 1, record)
        }
        _ => section.push(record),
    }
}
