use crate::{
    arn::{AccountId, GITHUB_OIDC_HOST},
    grant::PermissionScope,
    parameter::ParameterSource,
    simulate::{Decision, Simulator, TokenClaims},
    template::Template,
    trust::TrustScope,
    *,
};

const ACCOUNT: &str = "123456789012";
const REPO: &str = "rangle/cmap-availability";

fn config() -> StackConfig {
    let mut config = StackConfig {
        account: Some(AccountId::new(ACCOUNT).unwrap()),
        ..Default::default()
    };
    config.function.parameter.source = ParameterSource::Literal {
        value: "literal".to_owned(),
    };
    config
}

fn stack_with(f: impl FnOnce(&mut StackConfig)) -> Stack {
    let mut config = config();
    f(&mut config);
    Stack::new(&config).unwrap()
}

fn run(branch: &str, actor: &str) -> TokenClaims {
    TokenClaims::github_run(GITHUB_OIDC_HOST, REPO, branch, actor, false)
}

fn test_output_path(name: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(std::env!("CARGO_MANIFEST_DIR"))
        .join("test_output")
        .join(name)
}

#[test]
fn non_matching_tokens_are_denied() {
    let _ = env_logger::builder().try_init();
    let stack = Stack::new(&config()).unwrap();

    assert_eq!(
        Decision::Allowed,
        stack.simulate_assume(&run("main", "smoogly")).unwrap()
    );
    assert_eq!(
        Decision::ImplicitDeny,
        stack.simulate_assume(&run("main", "mallory")).unwrap(),
        "wrong actor"
    );
    assert_eq!(
        Decision::ImplicitDeny,
        stack.simulate_assume(&run("feature", "smoogly")).unwrap(),
        "wrong branch"
    );
    let other_repo = TokenClaims::github_run(GITHUB_OIDC_HOST, "rangle/other", "main", "smoogly", false);
    assert_eq!(
        Decision::ImplicitDeny,
        stack.simulate_assume(&other_repo).unwrap(),
        "wrong repository"
    );
    let wrong_audience = run("main", "smoogly").with("aud", "example.com");
    assert_eq!(
        Decision::ImplicitDeny,
        stack.simulate_assume(&wrong_audience).unwrap(),
        "wrong audience"
    );
    let no_actor = TokenClaims::issued_by(GITHUB_OIDC_HOST)
        .with("aud", "sts.amazonaws.com")
        .with("sub", "repo:rangle/cmap-availability:ref:refs/heads/main");
    assert_eq!(
        Decision::ImplicitDeny,
        stack.simulate_assume(&no_actor).unwrap(),
        "missing actor claim"
    );
    let other_issuer = TokenClaims::github_run("issuer.example.com", REPO, "main", "smoogly", false);
    assert_eq!(
        Decision::ImplicitDeny,
        stack.simulate_assume(&other_issuer).unwrap(),
        "claims of another issuer"
    );
}

#[test]
fn trust_scopes_are_different_postures() {
    let _ = env_logger::builder().try_init();

    let subject_only = stack_with(|c| c.github.scope = TrustScope::Subject);
    assert!(subject_only
        .simulate_assume(&run("main", "anyone"))
        .unwrap()
        .is_allowed());

    let embedded = stack_with(|c| c.github.scope = TrustScope::EmbeddedActor);
    // the repository has not customized its subject claim
    assert!(!embedded
        .simulate_assume(&run("main", "smoogly"))
        .unwrap()
        .is_allowed());
    let customized = TokenClaims::github_run_for_scope(
        GITHUB_OIDC_HOST,
        REPO,
        "main",
        "smoogly",
        TrustScope::EmbeddedActor,
    );
    assert!(embedded.simulate_assume(&customized).unwrap().is_allowed());
    let customized_other_actor =
        TokenClaims::github_run(GITHUB_OIDC_HOST, REPO, "main", "mallory", true);
    assert!(!embedded
        .simulate_assume(&customized_other_actor)
        .unwrap()
        .is_allowed());
}

#[test]
fn resource_pattern_matches_only_the_qualifier() {
    let _ = env_logger::builder().try_init();
    let stack = stack_with(|c| c.bootstrap_qualifier = arn::BootstrapQualifier::new("ci").unwrap());
    let assume = "sts:AssumeRoleWithWebIdentity";

    for (resource, allowed) in [
        ("arn:aws:iam::123456789012:role/cdk-ci-cfn-exec-role-123456789012-us-east-1", true),
        ("arn:aws:iam::123456789012:role/cdk-hnb659fds-cfn-exec-role-123456789012-us-east-1", false),
        ("arn:aws:iam::123456789012:role/cdk-ci-deploy-role-123456789012-us-east-1", false),
        ("arn:aws:iam::210987654321:role/cdk-ci-cfn-exec-role-210987654321-us-east-1", false),
    ] {
        assert_eq!(
            allowed,
            stack.simulate_access(assume, resource).unwrap().is_allowed(),
            "{resource}"
        );
    }
    assert!(!stack
        .simulate_access(
            "sts:AssumeRole",
            "arn:aws:iam::123456789012:role/cdk-ci-cfn-exec-role-123456789012-us-east-1"
        )
        .unwrap()
        .is_allowed());
}

#[test]
fn administrator_grant_is_unrestricted() {
    let _ = env_logger::builder().try_init();
    let requests = [
        ("s3:DeleteBucket", "arn:aws:s3:::important"),
        ("iam:CreateUser", "arn:aws:iam::123456789012:user/backdoor"),
        (
            "sts:AssumeRoleWithWebIdentity",
            "arn:aws:iam::123456789012:role/cdk-hnb659fds-cfn-exec-role-123456789012-us-east-1",
        ),
    ];

    let least = Stack::new(&config()).unwrap();
    assert!(!least.access_role.is_administrator());
    let least: Vec<_> = requests
        .iter()
        .map(|(action, resource)| least.simulate_access(action, resource).unwrap())
        .collect();
    assert_eq!(
        vec![Decision::ImplicitDeny, Decision::ImplicitDeny, Decision::Allowed],
        least
    );

    let mut admin_config = config();
    admin_config.permissions = PermissionScope::Administrator;
    assert!(matches!(
        Stack::new(&admin_config),
        Err(Error::AdministratorNotAllowed)
    ));
    admin_config.allow_administrator = true;
    let admin = Stack::new(&admin_config).unwrap();
    assert!(admin.access_role.is_administrator());
    for (action, resource) in requests {
        assert_eq!(
            Decision::Allowed,
            admin.simulate_access(action, resource).unwrap()
        );
    }
}

#[test]
fn mock_value_from_environment() {
    let _ = env_logger::builder().try_init();
    // MOCK_VALUE is only touched by this test
    std::env::set_var(parameter::MOCK_VALUE_VAR, "x");
    let stack = stack_with(|c| c.function.parameter.source = ParameterSource::default());
    std::env::remove_var(parameter::MOCK_VALUE_VAR);
    assert_eq!("x", stack.function.parameter.value);
    assert_eq!(
        Some(&"x".to_owned()),
        stack.function.environment().get("PARAMETER_VAL")
    );

    let stack = stack_with(|c| {
        c.function.parameter.source = ParameterSource::Env {
            var: "OIDC_STACK_TEST_NEVER_SET".to_owned(),
            fallback: parameter::MOCK_VALUE_FALLBACK.to_owned(),
        }
    });
    assert_eq!("UNKNOWN", stack.function.parameter.value);
}

#[test]
fn disabled_logging_denies_log_writes() {
    let _ = env_logger::builder().try_init();
    let account = AccountId::new(ACCOUNT).unwrap();
    let put_logs = simulate::Request::new(
        "logs:PutLogEvents",
        "arn:aws:logs:us-east-1:123456789012:log-group:/aws/lambda/x:*",
    );

    let quiet = Stack::new(&config()).unwrap();
    assert_eq!(
        Decision::ExplicitDeny,
        Simulator::for_role(account.clone(), &quiet.function_role).evaluate(&put_logs)
    );
    let read_parameter = simulate::Request::new("ssm:GetParameter", &quiet.function.parameter_arn);
    assert_eq!(
        "arn:aws:ssm:us-east-1:123456789012:parameter/ga-test-aws-deployment/dev/Parameter/VAL/value",
        read_parameter.resource
    );
    assert!(Simulator::for_role(account.clone(), &quiet.function_role)
        .evaluate(&read_parameter)
        .is_allowed());

    let loud = stack_with(|c| c.function.logging = true);
    assert_eq!(
        Decision::Allowed,
        Simulator::for_role(account, &loud.function_role).evaluate(&put_logs)
    );
}

#[test]
fn simulation_needs_an_account() {
    let mut config = config();
    config.account = None;
    let stack = Stack::new(&config).unwrap();
    assert!(matches!(
        stack.simulate_assume(&run("main", "smoogly")),
        Err(Error::MissingAccount { .. })
    ));
}

#[test]
fn synthesized_template() {
    let _ = env_logger::builder().try_init();
    let mut unknown_account = config();
    unknown_account.account = None;
    let stack = Stack::new(&unknown_account).unwrap();
    assert_eq!("dev-ga-test-aws-deployment", stack.name);
    let template = Template::synth(&stack).unwrap();
    let json = serde_json::to_value(&template).unwrap();

    let mut logical_ids: Vec<_> = template.resources.keys().cloned().collect();
    logical_ids.sort();
    assert_eq!(
        vec![
            "GithubActionAccess",
            "MockDeployment",
            "MockDeploymentParameterVAL",
            "MockDeploymentServiceRole",
        ],
        logical_ids
    );
    assert_eq!("2010-09-09", json["AWSTemplateFormatVersion"]);
    assert_eq!(
        serde_json::json!({ "Fn::GetAtt": ["GithubActionAccess", "Arn"] }),
        json["Outputs"]["githubAccessRoleArn"]["Value"]
    );

    let role = &json["Resources"]["GithubActionAccess"]["Properties"];
    assert_eq!(
        serde_json::json!({
            "Fn::Sub": "arn:aws:iam::${AWS::AccountId}:oidc-provider/token.actions.githubusercontent.com"
        }),
        role["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Federated"]
    );
    assert_eq!("cdk", role["Policies"][0]["PolicyName"]);
    assert_eq!(
        serde_json::json!({
            "Fn::Sub": "arn:aws:iam::${AWS::AccountId}:role/cdk-hnb659fds-cfn-exec-role-*"
        }),
        role["Policies"][0]["PolicyDocument"]["Statement"][0]["Resource"]
    );
    assert!(role.get("ManagedPolicyArns").is_none());

    let function = &json["Resources"]["MockDeployment"];
    assert_eq!("AWS::Lambda::Function", function["Type"]);
    assert_eq!(1, function["Properties"]["Timeout"]);
    assert_eq!(128, function["Properties"]["MemorySize"]);
    assert_eq!("mockdeploy/mockfn.handler", function["Properties"]["Handler"]);
    assert_eq!(
        "literal",
        function["Properties"]["Environment"]["Variables"]["PARAMETER_VAL"]
    );
    assert_eq!(
        serde_json::json!(["MockDeploymentServiceRole", "MockDeploymentParameterVAL"]),
        function["DependsOn"]
    );

    let parameter = &json["Resources"]["MockDeploymentParameterVAL"]["Properties"];
    assert_eq!("/ga-test-aws-deployment/dev/Parameter/VAL/value", parameter["Name"]);
    assert_eq!("literal", parameter["Value"]);

    // with a known account, ARNs are plain strings
    let stack = Stack::new(&config()).unwrap();
    let json = serde_json::to_value(Template::synth(&stack).unwrap()).unwrap();
    assert_eq!(
        "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com",
        json["Resources"]["GithubActionAccess"]["Properties"]["AssumeRolePolicyDocument"]
            ["Statement"][0]["Principal"]["Federated"]
    );
}

#[test]
fn construct_ids_must_name_distinct_resources() {
    let _ = env_logger::builder().try_init();

    // same logical id as the function, `MockDeployment`
    let stack = stack_with(|c| c.role_id = "mock_deployment".to_owned());
    assert!(matches!(
        Template::synth(&stack),
        Err(Error::DuplicateLogicalId { ref logical_id, .. }) if logical_id == "MockDeployment"
    ));

    let stack = stack_with(|c| c.function.id = "github_action_access".to_owned());
    assert!(matches!(
        Template::synth(&stack),
        Err(Error::DuplicateLogicalId { .. })
    ));

    let stack = stack_with(|c| c.role_id = "--".to_owned());
    assert!(matches!(
        Template::synth(&stack),
        Err(Error::InvalidLogicalId { ref id }) if id == "--"
    ));

    // distinct ids still synthesize, with the role under its own name
    let stack = stack_with(|c| c.role_id = "deploy-role".to_owned());
    let template = Template::synth(&stack).unwrap();
    assert_eq!("AWS::IAM::Role", template.resources["DeployRole"].ty);
    assert_eq!(
        serde_json::json!({ "Fn::GetAtt": ["DeployRole", "Arn"] }),
        template.outputs["githubAccessRoleArn"].value
    );
}

#[tokio::test]
async fn template_save_reports_changes() {
    let _ = env_logger::builder().try_init();
    let dir = test_output_path("template_save");
    if dir.exists() {
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
    let path = dir.join("template.json");

    let template = Template::synth(&Stack::new(&config()).unwrap()).unwrap();
    assert!(template.save(&path).await.unwrap(), "first save writes");
    assert!(!template.save(&path).await.unwrap(), "same template is unchanged");

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let read: Template = serde_json::from_str(&contents).unwrap();
    assert_eq!(template, read);

    let changed = Template::synth(&stack_with(|c| c.function.logging = true)).unwrap();
    assert!(changed.save(&path).await.unwrap(), "changed template is written");

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}
