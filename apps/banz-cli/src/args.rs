//! Parsers for the compact argument forms used on the command line.
//!
//! ```text
//! --item Caderno=2          LineItem { product_name: "Caderno", quantity: 2 }
//! --pay  pix=12,50          Payment  { method: Pix, amount: R$ 12,50 }
//! --min  6,00  / 6.00 / 6   Money    (600 centavos)
//! ```

use banz_core::{LineItem, Money, Payment, PaymentMethod, ValidationError};

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Parses an amount in reais. Accepts `,` or `.` as the decimal separator
/// and at most two decimal places.
pub fn parse_money(s: &str) -> Result<Money, ValidationError> {
    let s = s.trim().trim_start_matches("R$").trim();
    let (major, minor) = match s.rsplit_once(&[',', '.'][..]) {
        Some((major, minor)) => (major, minor),
        None => (s, ""),
    };

    if major.is_empty() && minor.is_empty() {
        return Err(invalid("amount", "empty"));
    }
    if minor.len() > 2 {
        return Err(invalid("amount", format!("'{}' has more than two decimals", s)));
    }

    let digits = |part: &str| -> Result<i64, ValidationError> {
        if part.is_empty() {
            return Ok(0);
        }
        if !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("amount", format!("'{}' is not a number", s)));
        }
        part.parse::<i64>()
            .map_err(|_| invalid("amount", format!("'{}' is too large", s)))
    };

    let reais = digits(major)?;
    // "12,5" means 12,50
    let centavos = match minor.len() {
        1 => digits(minor)? * 10,
        _ => digits(minor)?,
    };
    Ok(Money::from_major_minor(reais, centavos))
}

/// Parses `NAME=QTY`.
pub fn parse_item(s: &str) -> Result<LineItem, ValidationError> {
    let (name, qty) = s
        .rsplit_once('=')
        .ok_or_else(|| invalid("item", format!("'{}' is not NAME=QTY", s)))?;
    let quantity = qty
        .trim()
        .parse::<i64>()
        .map_err(|_| invalid("item", format!("'{}' is not a quantity", qty.trim())))?;
    Ok(LineItem::new(name.trim(), quantity))
}

/// Parses `METHOD=AMOUNT`.
pub fn parse_payment(s: &str) -> Result<Payment, ValidationError> {
    let (method, amount) = s
        .split_once('=')
        .ok_or_else(|| invalid("payment", format!("'{}' is not METHOD=AMOUNT", s)))?;
    let method: PaymentMethod = method.parse()?;
    Ok(Payment::new(method, parse_money(amount)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("10,00").unwrap().cents(), 1000);
        assert_eq!(parse_money("10.5").unwrap().cents(), 1050);
        assert_eq!(parse_money("R$ 8").unwrap().cents(), 800);
        assert_eq!(parse_money("0,05").unwrap().cents(), 5);
        assert!(parse_money("1,234").is_err());
        assert!(parse_money("dez").is_err());
        assert!(parse_money("").is_err());
    }

    #[test]
    fn test_parse_item() {
        let item = parse_item("Caderno Espiral = 3").unwrap();
        assert_eq!(item, LineItem::new("Caderno Espiral", 3));
        assert!(parse_item("Caderno").is_err());
        assert!(parse_item("Caderno=dois").is_err());
    }

    #[test]
    fn test_parse_payment() {
        let payment = parse_payment("pix=12,50").unwrap();
        assert_eq!(payment.method, PaymentMethod::Pix);
        assert_eq!(payment.amount().cents(), 1250);
        assert!(parse_payment("cheque=10").is_err());
        assert!(parse_payment("cash").is_err());
    }
}
