use anyhow::Result;
use weave_commands::KernelInfo;

use crate::opts::WeaveOpts;
use crate::session::build_host;

pub async fn cmd_info(opts: &WeaveOpts) -> Result<()> {
    let host = build_host(opts).await?;
    let root = host.root();

    let mut infos = vec![root.info()];
    infos.extend(
        root.child_names()
            .iter()
            .filter_map(|name| root.kernel(name))
            .map(|handle| handle.info()),
    );

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    for info in &infos {
        println!("{}", describe(info));
    }
    if let Some(default) = &host.config().default_kernel {
        println!("default kernel: {default}");
    }
    Ok(())
}

fn describe(info: &KernelInfo) -> String {
    let commands: Vec<&str> = info.supported_commands.iter().map(|k| k.as_str()).collect();
    format!(
        "{:<12} language={:<10} runtime={:<10} commands={}",
        info.name,
        info.language_name.as_deref().unwrap_or("-"),
        info.runtime.as_deref().unwrap_or("-"),
        commands.join(",")
    )
}
