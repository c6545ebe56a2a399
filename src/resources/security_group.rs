use super::*;

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub description: String,
    pub vpc_id: Value,
    /// when false, a rule that matches no traffic is added so that
    /// EC2 doesn't add its default allow-all egress rule.
    pub allow_all_outbound: bool,
}

impl CfnResource for SecurityGroup {
    fn type_string(&self) -> &'static str {
        "AWS::EC2::SecurityGroup"
    }

    fn properties(&self) -> Value {
        let egress = if self.allow_all_outbound {
            json!([{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1", "Description": "Allow all outbound traffic by default" }])
        } else {
            json!([{
                "CidrIp": "255.255.255.255/32",
                "Description": "Disallow all traffic",
                "IpProtocol": "icmp",
                "FromPort": 252,
                "ToPort": 86,
            }])
        };
        json!({
            "GroupDescription": self.description,
            "VpcId": self.vpc_id,
            "SecurityGroupEgress": egress,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.description.is_empty() || self.description.len() > 255 {
            return Err(format!("Invalid security group description {:?}\nMust be between 1 and 255 characters", self.description));
        }
        Ok(())
    }
}

/// the other side of a security group rule.
#[derive(Debug, Clone)]
pub enum Peer {
    SecurityGroup(Value),
    Cidr(Value),
    PrefixList(Value),
}

impl Peer {
    pub fn any_ipv4() -> Self {
        Peer::Cidr(json!("0.0.0.0/0"))
    }

    fn insert_into(&self, props: &mut Value, ingress: bool) {
        let (key, value) = match (self, ingress) {
            (Peer::SecurityGroup(id), true) => ("SourceSecurityGroupId", id),
            (Peer::SecurityGroup(id), false) => ("DestinationSecurityGroupId", id),
            (Peer::Cidr(cidr), _) => ("CidrIp", cidr),
            (Peer::PrefixList(id), true) => ("SourcePrefixListId", id),
            (Peer::PrefixList(id), false) => ("DestinationPrefixListId", id),
        };
        props[key] = value.clone();
    }
}

/// a single tcp port opened on `group_id`, as its own resource so that
/// groups can reference each other without a cycle.
#[derive(Debug, Clone)]
pub struct SecurityGroupRule {
    pub ingress: bool,
    pub group_id: Value,
    pub peer: Peer,
    pub port: u16,
    pub description: String,
}

impl SecurityGroupRule {
    pub fn ingress(group_id: Value, peer: Peer, port: u16, description: &str) -> Self {
        Self { ingress: true, group_id, peer, port, description: description.to_string() }
    }

    pub fn egress(group_id: Value, peer: Peer, port: u16, description: &str) -> Self {
        Self { ingress: false, group_id, peer, port, description: description.to_string() }
    }
}

impl CfnResource for SecurityGroupRule {
    fn type_string(&self) -> &'static str {
        if self.ingress {
            "AWS::EC2::SecurityGroupIngress"
        } else {
            "AWS::EC2::SecurityGroupEgress"
        }
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "GroupId": self.group_id,
            "IpProtocol": "tcp",
            "FromPort": self.port,
            "ToPort": self.port,
            "Description": self.description,
        });
        self.peer.insert_into(&mut props, self.ingress);
        props
    }

    fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Security group rule port must be between 1 and 65535".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_egress_by_default() {
        let sg = SecurityGroup { description: "RDS SG".into(), vpc_id: get_ref("Vpc"), allow_all_outbound: false };
        let props = sg.properties();
        assert_eq!(props["SecurityGroupEgress"][0]["CidrIp"], "255.255.255.255/32");
    }

    #[test]
    fn peers_map_to_direction_specific_keys() {
        let rule = SecurityGroupRule::ingress(get_ref("Alb"), Peer::PrefixList(json!("pl-1")), 443, "CloudFront on port 443");
        assert_eq!(rule.type_string(), "AWS::EC2::SecurityGroupIngress");
        assert_eq!(rule.properties()["SourcePrefixListId"], "pl-1");

        let rule = SecurityGroupRule::egress(get_ref("Instance"), Peer::SecurityGroup(get_ref("Db")), 3306, "Instances to database");
        assert_eq!(rule.type_string(), "AWS::EC2::SecurityGroupEgress");
        assert_eq!(rule.properties()["DestinationSecurityGroupId"]["Ref"], "Db");
        assert_eq!(rule.properties()["FromPort"], 3306);
    }
}
