// CLI modules
mod args;
mod op;
mod ops;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{
    Consolidate, Create, Extend, Filter, Get, Identity, Init, Pop, Push, Recover, Rotate, Set,
    Shift, Unset, Unshift, Version,
};

command_enum! {
    (Init, Init),
    (Create, Create),
    (Recover, Recover),
    (Rotate, Rotate),
    (Get, Get),
    (Set, Set),
    (Unset, Unset),
    (Extend, Extend),
    (Unshift, Unshift),
    (Push, Push),
    (Pop, Pop),
    (Shift, Shift),
    (Filter, Filter),
    (Consolidate, Consolidate),
    (Identity, Identity),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = match op::OpContext::new(args.remote, args.config_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let _guards = blobvault::logging::init_logging(&ctx.config);
    blobvault::version::report_build_info();

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush the non-blocking writers before exiting
    drop(_guards);
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_commands() {
        let args = Args::try_parse_from([
            "bvault", "set", "--id", "b1", "--key", "00", "/a/b", "5",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Set(ref set) if set.pointer == "/a/b" && set.value == "5"
        ));

        let args = Args::try_parse_from(["bvault", "get", "--id", "b1", "--key", "00"]).unwrap();
        assert!(matches!(args.command, Command::Get(ref get) if get.pointer.is_empty()));

        let args = Args::try_parse_from([
            "bvault",
            "--remote",
            "https://vault.example.com",
            "filter",
            "--id",
            "b1",
            "--key",
            "00",
            "/contacts",
            "name",
            "\"bob\"",
            "[[\"unset\", \"/tag\"]]",
        ])
        .unwrap();
        assert_eq!(
            args.remote.map(|u| u.to_string()),
            Some("https://vault.example.com/".to_string())
        );
        assert!(matches!(args.command, Command::Filter(ref f) if f.field == "name"));
    }

    #[test]
    fn test_parse_account_commands() {
        let args = Args::try_parse_from([
            "bvault",
            "create",
            "--account",
            "ann",
            "--master-secret",
            "00ff",
            "--unlock-key",
            "11",
            "--email",
            "ann@example.com",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Create(ref create)
                if create.account == "ann" && create.id.is_none() && create.key.is_none()
        ));

        let args = Args::try_parse_from([
            "bvault", "recover", "--account", "ann", "--master-secret", "00ff",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Recover(ref r) if r.account == "ann"));

        let args = Args::try_parse_from([
            "bvault",
            "rotate",
            "--id",
            "b1",
            "--key",
            "00",
            "--account",
            "ann",
            "--master-secret",
            "00ff",
            "--unlock-key",
            "22",
            "--new-id",
            "b2",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Rotate(ref rotate)
                if rotate.blob.id == "b1" && rotate.new_id.as_deref() == Some("b2")
        ));

        assert!(Args::try_parse_from(["bvault", "recover", "--account", "ann"]).is_err());
    }

    #[test]
    fn test_parse_identity_commands() {
        let args = Args::try_parse_from([
            "bvault",
            "identity",
            "set",
            "--id",
            "b1",
            "--key",
            "00",
            "--field-key",
            "11",
            "email",
            "a@example.com",
        ])
        .unwrap();
        let Command::Identity(identity) = args.command else {
            panic!("expected identity command");
        };
        assert!(matches!(
            identity.command,
            ops::identity::IdentityCommand::Set(ref set)
                if set.field == "email" && set.field_key.as_deref() == Some("11")
        ));

        assert!(Args::try_parse_from(["bvault", "set", "--id", "b1", "/a", "1"]).is_err());
    }
}
