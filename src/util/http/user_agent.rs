use rand::Rng;

const CHROME_VERSIONS: [&str; 12] = [
    "126.0.6478.126",
    "127.0.6533.119",
    "128.0.6613.138",
    "129.0.6668.89",
    "130.0.6723.117",
    "131.0.6778.108",
    "132.0.6834.110",
    "133.0.6943.98",
    "134.0.6998.89",
    "135.0.7049.85",
    "136.0.7103.93",
    "137.0.7151.69",
];

const FIREFOX_VERSIONS: [&str; 8] = [
    "128.0", "129.0", "130.0", "131.0", "132.0", "133.0", "134.0", "135.0",
];

const EDGE_VERSIONS: [&str; 6] = [
    "131.0.2903.112",
    "132.0.2957.140",
    "133.0.3065.82",
    "134.0.3124.93",
    "135.0.3179.85",
    "136.0.3240.76",
];

const SAFARI_VERSIONS: [&str; 5] = ["16.6", "17.4.1", "17.6", "18.1", "18.3"];

const DESKTOP_OS: [&str; 9] = [
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; WOW64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 13_6_9",
    "Macintosh; Intel Mac OS X 14_7_2",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
    "X11; Fedora; Linux x86_64",
];

const MAC_OS: [&str; 4] = [
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 13_6_9",
    "Macintosh; Intel Mac OS X 14_7_2",
    "Macintosh; Intel Mac OS X 15_2",
];

fn pick<'a>(rng: &mut impl Rng, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

fn gen_chrome_ua(rng: &mut impl Rng) -> String {
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        pick(rng, &DESKTOP_OS),
        pick(rng, &CHROME_VERSIONS)
    )
}

fn gen_firefox_ua(rng: &mut impl Rng) -> String {
    let version = pick(rng, &FIREFOX_VERSIONS);
    format!(
        "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
        pick(rng, &DESKTOP_OS),
        version,
        version
    )
}

fn gen_edge_ua(rng: &mut impl Rng) -> String {
    let edge = pick(rng, &EDGE_VERSIONS);
    let chrome = format!("{}.0.0.0", edge.split('.').next().unwrap_or("131"));
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36 Edg/{}",
        pick(rng, &DESKTOP_OS[..3]),
        chrome,
        edge
    )
}

fn gen_safari_ua(rng: &mut impl Rng) -> String {
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{} Safari/605.1.15",
        pick(rng, &MAC_OS),
        pick(rng, &SAFARI_VERSIONS)
    )
}

/// 隨機產生桌面瀏覽器的 User-Agent，Chrome 的比重較高
pub fn gen_random_ua() -> String {
    let mut rng = rand::rng();
    match rng.random_range(0..10) {
        0..=4 => gen_chrome_ua(&mut rng),
        5..=6 => gen_edge_ua(&mut rng),
        7..=8 => gen_firefox_ua(&mut rng),
        _ => gen_safari_ua(&mut rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ua_formats() {
        for _ in 0..100 {
            let ua = gen_random_ua();
            assert!(ua.starts_with("Mozilla/5.0 ("), "UA should start with Mozilla/5.0: {}", ua);
            assert!(ua.len() > 50, "UA should be reasonably long: {}", ua);
            assert!(!ua.contains("{}"), "UA left a placeholder: {}", ua);
        }
    }

    #[test]
    fn test_edge_matches_chrome_major() {
        let mut rng = rand::rng();
        let ua = gen_edge_ua(&mut rng);
        let edge = ua.rsplit("Edg/").next().unwrap();
        let major = edge.split('.').next().unwrap();
        assert!(ua.contains(&format!("Chrome/{}.0.0.0", major)), "{}", ua);
    }
}
