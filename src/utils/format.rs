/// Render a raw token quantity with its decimals, trimming trailing zeros
pub fn format_token_amount(amount: u128, decimals: u32) -> String {
	let Some(scale) = 10u128.checked_pow(decimals) else {
		return format!("{}e-{}", amount, decimals);
	};
	let whole = amount / scale;
	let fraction = amount % scale;
	if fraction == 0 {
		return whole.to_string();
	}
	let fraction = format!("{:0width$}", fraction, width = decimals as usize);
	format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

pub fn format_fiat(value: f64, fiat_code: &str) -> String {
	format!("{:.2} {}", value, fiat_code)
}
