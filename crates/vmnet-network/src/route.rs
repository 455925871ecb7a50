//! Default route inspection.

/// Interface of the first default route in `ip route show default` output.
///
/// Lines look like `default via 192.168.1.1 dev eth0 proto dhcp metric 100`.
pub fn parse_default_route(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::split_whitespace)
        .filter_map(|mut fields| {
            if fields.next()? != "default" {
                return None;
            }
            fields.skip_while(|f| *f != "dev").nth(1).map(str::to_string)
        })
        .next()
}
