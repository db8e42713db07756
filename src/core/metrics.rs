use tokio::process::Command;

/// Read-only system snapshot for status reporting. Every probe is
/// best-effort: a missing tool or failed command simply leaves its field
/// empty. Nothing in the core depends on any of these values.
#[derive(Debug, Clone, Default)]
pub struct SystemStatus {
    pub temperature: Option<String>,
    pub uptime: Option<String>,
    pub memory: Option<String>,
    pub disk: Option<String>,
    pub local_ip: Option<String>,
    pub hostname: Option<String>,
}

pub async fn snapshot() -> SystemStatus {
    SystemStatus {
        temperature: probe("vcgencmd", &["measure_temp"])
            .await
            .map(|s| s.trim().trim_start_matches("temp=").to_string()),
        uptime: probe("uptime", &["-p"]).await.map(|s| s.trim().to_string()),
        memory: probe("free", &["-h"]).await.and_then(|s| parse_free(&s)),
        disk: probe("df", &["-h", "/"]).await.and_then(|s| parse_df(&s)),
        local_ip: probe("hostname", &["-I"])
            .await
            .and_then(|s| s.split_whitespace().next().map(str::to_string)),
        hostname: hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned()),
    }
}

async fn probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `free -h` second line: total is field 1, used is field 2.
fn parse_free(output: &str) -> Option<String> {
    let fields: Vec<&str> = output.lines().nth(1)?.split_whitespace().collect();
    let total = fields.get(1)?;
    let used = fields.get(2)?;
    Some(format!("{used} / {total}"))
}

/// `df -h /` second line: size, used, and use% are fields 1, 2 and 4.
fn parse_df(output: &str) -> Option<String> {
    let fields: Vec<&str> = output.lines().nth(1)?.split_whitespace().collect();
    let total = fields.get(1)?;
    let used = fields.get(2)?;
    let percent = fields.get(4)?;
    Some(format!("{used} / {total} ({percent})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_free_output() {
        let output = "\
              total        used        free      shared  buff/cache   available
Mem:           3.7Gi       1.2Gi       1.8Gi        96Mi       812Mi       2.3Gi
Swap:          99Mi           0B        99Mi
";
        assert_eq!(parse_free(output).as_deref(), Some("1.2Gi / 3.7Gi"));
    }

    #[test]
    fn parses_df_output() {
        let output = "\
Filesystem      Size  Used Avail Use% Mounted on
/dev/root        29G   12G   16G  43% /
";
        assert_eq!(parse_df(output).as_deref(), Some("12G / 29G (43%)"));
    }

    #[test]
    fn malformed_probe_output_is_none() {
        assert!(parse_free("").is_none());
        assert!(parse_df("Filesystem\n").is_none());
    }
}
