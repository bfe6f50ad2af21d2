//! Context-block reconstruction.
//!
//! A detail-event body is split on the `(Name1|Name2)=` marker, which removes
//! the property names from the text. Each split group after the first is the
//! value of one detail property; its name sits immediately before it in the
//! original body. The scanner walks the body backward from the end: it steps
//! over a group's value using the group's exact length, then collects the
//! letters of the name that precedes it (read backward) until it reaches the
//! comma that separates it from the previous group.

/// Scanner states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    ScanningValue,
    ScanningKey,
    GroupComplete,
    Done,
}

/// Reverse scanner over a detail-event body with an explicit cursor
pub(crate) struct ReverseScanner<'a> {
    body: &'a [u8],
    groups: &'a [&'a str],
    /// Exclusive end of the not-yet-consumed part of `body`
    cursor: usize,
    group: usize,
    state: ScanState,
    key: Vec<u8>,
    value: &'a str,
}

impl<'a> ReverseScanner<'a> {
    /// `groups` must be the result of splitting `body` on the detail marker.
    pub(crate) fn new(body: &'a str, groups: &'a [&'a str]) -> Self {
        let state = if groups.len() > 1 {
            ScanState::ScanningValue
        } else {
            ScanState::Done
        };
        Self {
            body: body.as_bytes(),
            groups,
            cursor: body.len(),
            group: groups.len().saturating_sub(1),
            state,
            key: Vec::new(),
            value: "",
        }
    }

    fn step(&mut self) -> Option<(String, &'a str)> {
        match self.state {
            ScanState::ScanningValue => {
                let raw = self.groups[self.group];
                self.cursor = self.cursor.saturating_sub(raw.len());
                self.value = raw.trim_end_matches(',');
                self.key.clear();
                self.state = ScanState::ScanningKey;
                None
            }
            ScanState::ScanningKey => {
                while self.cursor > 0 {
                    let c = self.body[self.cursor - 1];
                    if c == b',' {
                        break;
                    }
                    self.cursor -= 1;
                    if c.is_ascii_alphabetic() {
                        self.key.push(c);
                    }
                }
                self.state = ScanState::GroupComplete;
                None
            }
            ScanState::GroupComplete => {
                self.key.reverse();
                let key = String::from_utf8_lossy(&self.key).to_lowercase();
                self.group -= 1;
                self.state = if self.group == 0 {
                    ScanState::Done
                } else {
                    ScanState::ScanningValue
                };
                Some((key, self.value))
            }
            ScanState::Done => None,
        }
    }
}

impl<'a> Iterator for ReverseScanner<'a> {
    type Item = (String, &'a str);

    /// Yields `(lowercased key, raw value)` pairs, last group first.
    /// Groups whose key cannot be recovered are skipped.
    fn next(&mut self) -> Option<Self::Item> {
        while self.state != ScanState::Done {
            if let Some((key, value)) = self.step() {
                if !key.is_empty() {
                    return Some((key, value));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn scan(body: &str, pattern: &str) -> Vec<(String, String)> {
        let re = Regex::new(pattern).unwrap();
        let groups: Vec<&str> = re.split(body).collect();
        ReverseScanner::new(body, &groups)
            .map(|(k, v)| (k, v.to_string()))
            .collect()
    }

    #[test]
    fn test_two_groups_recovered_backward() {
        let body = "0,DBMSSQL,3,p=r,Sql='select 1',Rows=1,Context='Form.Module : 12'";
        let pairs = scan(body, "(Context|Sql)=");
        assert_eq!(
            pairs,
            vec![
                ("context".to_string(), "'Form.Module : 12'".to_string()),
                ("sql".to_string(), "'select 1',Rows=1".to_string()),
            ]
        );
    }

    #[test]
    fn test_marker_at_body_start() {
        let pairs = scan("Context=abc", "(Context)=");
        assert_eq!(pairs, vec![("context".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_no_marker_yields_nothing() {
        assert!(scan("0,CALL,1,p=r", "(Context)=").is_empty());
    }

    #[test]
    fn test_marker_inside_longer_name_keeps_letters() {
        // "MySql=" matches "Sql="; the scanner still reads the whole letter run
        let pairs = scan("0,X,1,MySql=v", "(Sql)=");
        assert_eq!(pairs, vec![("mysql".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_multibyte_values_do_not_break_cursor() {
        let body = "0,EXCP,1,Descr='ошибка',Context='Модуль, строка 5'";
        let pairs = scan(body, "(Descr|Context)=");
        assert_eq!(pairs[0], ("context".to_string(), "'Модуль, строка 5'".to_string()));
        assert_eq!(pairs[1], ("descr".to_string(), "'ошибка'".to_string()));
    }
}
