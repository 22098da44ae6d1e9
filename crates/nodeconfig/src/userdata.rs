//! userData bootstrap payload
//!
//! Fresh Windows instances run this PowerShell on first boot. It installs
//! OpenSSH Server, authorizes the operator's public key for administrators
//! and opens the kubelet port. The payload is a pure function of the private
//! key, so the controller can detect a stale userData secret by regenerating
//! it and comparing bytes.

use crate::error::NodeConfigError;
use crate::signer::authorized_key;

const AUTHORIZED_KEY_PLACEHOLDER: &str = "{{AUTHORIZED_KEY}}";

const TEMPLATE: &str = r#"<powershell>
Add-WindowsCapability -Online -Name OpenSSH.Server~~~~0.0.1.0
$authorizedKeyConf = "$env:ProgramData\ssh\administrators_authorized_keys"
$authorizedKeyFolder = Split-Path -Path $authorizedKeyConf
if (!(Test-Path $authorizedKeyFolder)) {
  New-Item -Path $authorizedKeyFolder -ItemType Directory
}
Write-Output "{{AUTHORIZED_KEY}}" | Out-File $authorizedKeyConf -Encoding ascii
$acl = Get-Acl $authorizedKeyConf
$acl.SetAccessRuleProtection($true, $false)
$administratorsRule = New-Object system.security.accesscontrol.filesystemaccessrule("Administrators","FullControl","Allow")
$systemRule = New-Object system.security.accesscontrol.filesystemaccessrule("SYSTEM","FullControl","Allow")
$acl.SetAccessRule($administratorsRule)
$acl.SetAccessRule($systemRule)
$acl | Set-Acl
Set-Service -Name sshd -StartupType 'Automatic'
Start-Service sshd
New-NetFirewallRule -DisplayName "ContainerLogsPort" -Direction Inbound -Action Allow -Protocol TCP -LocalPort 10250 -EdgeTraversalPolicy Allow
</powershell>
<persist>true</persist>
"#;

/// Rendered bootstrap payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub content: Vec<u8>,
}

/// Render the userData payload that authorizes `private_key`'s public half
pub fn generate_user_data(private_key: &[u8]) -> Result<UserData, NodeConfigError> {
    let key = authorized_key(private_key)?;
    Ok(UserData {
        content: TEMPLATE.replace(AUTHORIZED_KEY_PLACEHOLDER, &key).into_bytes(),
    })
}
