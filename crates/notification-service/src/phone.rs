//! 手机号规范化
//!
//! 去掉所有非数字字符后补全国家码。不做长度校验，号码是否有效由网关判断。

/// 本地号码的位数，恰好 10 位时总是补国家码
const LOCAL_NUMBER_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneFormatter {
    country_code: String,
}

impl PhoneFormatter {
    pub fn new(country_code: impl Into<String>) -> Self {
        let country_code: String = country_code
            .into()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        Self { country_code }
    }

    /// 规范化为纯数字的国际号码
    ///
    /// 恰好 10 位的号码一律视为本地号码，即使它恰好以国家码开头；
    /// 其余号码只在不以国家码开头时补全。空输入返回空串。
    pub fn format(&self, raw: &str) -> String {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return digits;
        }

        if digits.len() == LOCAL_NUMBER_DIGITS || !digits.starts_with(&self.country_code) {
            format!("{}{}", self.country_code, digits)
        } else {
            digits
        }
    }
}

impl Default for PhoneFormatter {
    fn default() -> Self {
        Self::new("91")
    }
}
